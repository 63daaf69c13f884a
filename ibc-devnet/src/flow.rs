//! Picks and runs the handshake sequence fitting the two endpoints of a channel request.

use std::sync::Arc;

use displaydoc::Display;
use ibc_core_channel_types::channel::Order;
use ibc_core_host_types::identifiers::{ClientId, PortId};
use ibc_devnet_types::chain::{ChainRecord, EndpointKind};
use ibc_devnet_types::config::HandshakeConfig;
use ibc_devnet_types::endpoint::{ChannelEndpoint, ChannelOutcome, ChannelRequest, Endpoint};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::path::Path;
use ibc_devnet_types::relayer::{RelayerIdentity, RelayerRole};
use ibc_devnet_types::runtime::DevnetRuntime;
use tracing::info;

use crate::chain::{ChainConnector, NativeChain};
use crate::error::HandshakeError;
use crate::event::EventWatcher;
use crate::handshake::{
    virtual_port_id, ChannelHandshaker, VirtualChannelLink, CHANNEL_OPEN_INIT, CHANNEL_OPEN_TRY,
};
use crate::path::{vibc_path_from_chain_clients, wait_for_path_connection};
use crate::relayer::RelayerLauncher;

/// The handshake sequence a pair of endpoints calls for, named from `a` to `b`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum HandshakeFlow {
    /// virtual to native
    VirtualToNative,
    /// native to virtual
    NativeToVirtual,
    /// virtual to virtual
    VirtualToVirtual,
    /// native to native
    NativeToNative,
}

impl HandshakeFlow {
    pub fn select(a: EndpointKind, b: EndpointKind) -> Self {
        match (a, b) {
            (EndpointKind::Virtual, EndpointKind::Native) => Self::VirtualToNative,
            (EndpointKind::Native, EndpointKind::Virtual) => Self::NativeToVirtual,
            (EndpointKind::Virtual, EndpointKind::Virtual) => Self::VirtualToVirtual,
            (EndpointKind::Native, EndpointKind::Native) => Self::NativeToNative,
        }
    }
}

/// Everything a handshake flow reaches out to.
#[derive(Clone, Copy)]
pub struct FlowContext<'a> {
    pub runtime: &'a DevnetRuntime,
    pub connector: &'a dyn ChainConnector,
    pub launcher: &'a dyn RelayerLauncher,
    pub config: &'a HandshakeConfig,
}

impl FlowContext<'_> {
    /// Runs the complete handshake between the two endpoints of `request`.
    ///
    /// Every relayer the handshake attached to is pushed onto `relayers` as it was left, also
    /// when the handshake fails halfway, so the caller can record what was started.
    pub async fn open_channel(
        &self,
        request: &ChannelRequest,
        relayers: &mut Vec<RelayerIdentity>,
    ) -> Result<ChannelOutcome, HandshakeError> {
        let a = self.runtime.chain(&request.a.chain)?;
        let b = self.runtime.chain(&request.b.chain)?;
        let flow = HandshakeFlow::select(
            a.chain_type.endpoint_kind(),
            b.chain_type.endpoint_kind(),
        );

        info!(a = %a.name, b = %b.name, %flow, "opening channel");

        match flow {
            HandshakeFlow::VirtualToNative => {
                let (virtual_end, native_end) = self
                    .virtual_to_native(&request.a, &request.b, request, relayers)
                    .await?;
                Ok(ChannelOutcome {
                    a: virtual_end,
                    b: native_end,
                })
            }
            HandshakeFlow::NativeToVirtual => {
                let (native_end, virtual_end) = self
                    .native_to_virtual(&request.a, &request.b, request, relayers)
                    .await?;
                Ok(ChannelOutcome {
                    a: native_end,
                    b: virtual_end,
                })
            }
            HandshakeFlow::VirtualToVirtual | HandshakeFlow::NativeToNative => {
                Err(HandshakeError::UnsupportedFlow { flow })
            }
        }
    }

    /// The virtual chain opens, the native chain answers.
    async fn virtual_to_native(
        &self,
        virtual_endpoint: &Endpoint,
        native_endpoint: &Endpoint,
        request: &ChannelRequest,
        relayers: &mut Vec<RelayerIdentity>,
    ) -> Result<(ChannelEndpoint, ChannelEndpoint), HandshakeError> {
        let ordering = request.ordering;
        let hub_chain = self.native_chain(self.runtime.hub()?).await?;
        let dst_chain = self
            .native_chain(self.runtime.chain(&native_endpoint.chain)?)
            .await?;

        let path = vibc_path_from_chain_clients(
            hub_chain.as_ref(),
            &virtual_endpoint.chain,
            dst_chain.as_ref(),
            &self.config.prefixes,
        )
        .await?;

        let mut link = self
            .virtual_link(hub_chain, virtual_endpoint, &path, ordering)
            .await?;
        let mut dst = self
            .handshaker(dst_chain, native_endpoint, ordering)
            .await?;

        let opened = async {
            if request.register_port {
                link.hub()
                    .register_port(hub_virtual_client(&path)?, link.address())
                    .await?;
            }

            let hops = path.connection_hops()?;
            link.open_ibc_channel(&dst, hops.clone(), virtual_endpoint.version.clone(), ordering)
                .await?;
            link.start_relaying(&hops).await?;

            dst.chan_open_try(
                link.hub_mut(),
                path.reverse().connection_hops()?,
                CHANNEL_OPEN_INIT,
            )
            .await?;
            link.hub_mut().chan_open_ack(&mut dst, CHANNEL_OPEN_TRY).await?;
            dst.chan_open_confirm(CHANNEL_OPEN_TRY).await?;

            link.wait_for_connected().await?;

            Ok::<_, HandshakeError>((
                channel_endpoint(&virtual_endpoint.chain, link.hub())?,
                channel_endpoint(&native_endpoint.chain, &dst)?,
            ))
        }
        .await;

        relayers.push(link.relayer_identity());
        opened
    }

    /// The native chain opens, the virtual chain answers.
    async fn native_to_virtual(
        &self,
        native_endpoint: &Endpoint,
        virtual_endpoint: &Endpoint,
        request: &ChannelRequest,
        relayers: &mut Vec<RelayerIdentity>,
    ) -> Result<(ChannelEndpoint, ChannelEndpoint), HandshakeError> {
        let ordering = request.ordering;
        let hub_chain = self.native_chain(self.runtime.hub()?).await?;
        let src_chain = self
            .native_chain(self.runtime.chain(&native_endpoint.chain)?)
            .await?;

        wait_for_path_connection(
            src_chain.as_ref(),
            hub_chain.as_ref(),
            &self.config.prefixes,
            self.config.poll,
        )
        .await?;

        let path = vibc_path_from_chain_clients(
            hub_chain.as_ref(),
            &virtual_endpoint.chain,
            src_chain.as_ref(),
            &self.config.prefixes,
        )
        .await?;

        let mut link = self
            .virtual_link(hub_chain, virtual_endpoint, &path, ordering)
            .await?;
        let mut src = self
            .handshaker(src_chain, native_endpoint, ordering)
            .await?;

        let opened = async {
            if request.register_port {
                link.hub()
                    .register_port(hub_virtual_client(&path)?, link.address())
                    .await?;
            }

            src.chan_open_init(link.hub(), path.reverse().connection_hops()?)
                .await?;

            let hops = path.connection_hops()?;
            link.open_ibc_channel(&src, hops.clone(), virtual_endpoint.version.clone(), ordering)
                .await?;
            link.start_relaying(&hops).await?;

            src.chan_open_ack(link.hub_mut(), CHANNEL_OPEN_TRY).await?;
            link.hub_mut().chan_open_confirm(CHANNEL_OPEN_TRY).await?;

            link.wait_for_connected().await?;

            Ok::<_, HandshakeError>((
                channel_endpoint(&native_endpoint.chain, &src)?,
                channel_endpoint(&virtual_endpoint.chain, link.hub())?,
            ))
        }
        .await;

        relayers.push(link.relayer_identity());
        opened
    }

    async fn native_chain(
        &self,
        record: &ChainRecord,
    ) -> Result<Arc<dyn NativeChain>, HandshakeError> {
        self.connector.native(record, self.config).await
    }

    async fn handshaker(
        &self,
        chain: Arc<dyn NativeChain>,
        endpoint: &Endpoint,
        ordering: Order,
    ) -> Result<ChannelHandshaker, HandshakeError> {
        let port_id: PortId = endpoint.port_or_address.parse()?;

        ChannelHandshaker::new(chain, port_id, endpoint.version.clone(), ordering, self.config).await
    }

    /// Attaches to the relayer serving the hub/virtual pair and pairs it with a handshaker for
    /// the hub port bound to the virtual endpoint's contract.
    async fn virtual_link(
        &self,
        hub_chain: Arc<dyn NativeChain>,
        endpoint: &Endpoint,
        path: &Path,
        ordering: Order,
    ) -> Result<VirtualChannelLink, HandshakeError> {
        let identity = self
            .runtime
            .relayers
            .get(RelayerRole::VIbc)
            .ok_or(HandshakeError::MissingRelayer {
                role: RelayerRole::VIbc,
            })?;
        let relayer = self
            .launcher
            .launch(RelayerRole::VIbc, Some(identity))
            .await?;

        let port_id = virtual_port_id(
            &self.config.prefixes,
            hub_virtual_client(path)?,
            &endpoint.port_or_address,
        )?;
        let hub = ChannelHandshaker::new(
            hub_chain,
            port_id,
            endpoint.version.clone(),
            ordering,
            self.config,
        )
        .await?;

        let dispatcher = self
            .connector
            .dispatcher(self.runtime.chain(&endpoint.chain)?, self.config)
            .await?;
        let events = EventWatcher::new(dispatcher, self.config.poll).await?;

        Ok(VirtualChannelLink::new(
            hub,
            events,
            endpoint.port_or_address.clone(),
            relayer,
        ))
    }
}

/// Client the hub keeps for the virtual chain of a two-hop path.
fn hub_virtual_client(path: &Path) -> Result<&ClientId, DevnetError> {
    path.hop()
        .first()
        .ok_or_else(|| DevnetError::IncompletePathEnd {
            name: path.name(),
            field: "hop",
        })?
        .require_client()
}

fn channel_endpoint(
    chain: &str,
    handshaker: &ChannelHandshaker,
) -> Result<ChannelEndpoint, HandshakeError> {
    Ok(ChannelEndpoint {
        chain: chain.to_string(),
        port_id: handshaker.port_id().to_string(),
        channel_id: handshaker.require_channel()?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(EndpointKind::Virtual, EndpointKind::Native, HandshakeFlow::VirtualToNative)]
    #[case(EndpointKind::Native, EndpointKind::Virtual, HandshakeFlow::NativeToVirtual)]
    #[case(EndpointKind::Virtual, EndpointKind::Virtual, HandshakeFlow::VirtualToVirtual)]
    #[case(EndpointKind::Native, EndpointKind::Native, HandshakeFlow::NativeToNative)]
    fn flow_follows_endpoint_kinds(
        #[case] a: EndpointKind,
        #[case] b: EndpointKind,
        #[case] expected: HandshakeFlow,
    ) {
        assert_eq!(HandshakeFlow::select(a, b), expected);
    }

    #[test]
    fn unsupported_flows_are_named() {
        let err = HandshakeError::UnsupportedFlow {
            flow: HandshakeFlow::VirtualToVirtual,
        };

        assert_eq!(
            err.to_string(),
            "`virtual to virtual` channel handshakes are not implemented"
        );
    }
}
