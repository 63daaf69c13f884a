use core::fmt;
use core::str::FromStr;

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use ibc_devnet_types::chain::AccountRecord;
use ibc_devnet_types::config::TxConfig;
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::msgs::{PubKey, SECP256K1_PUB_KEY_TYPE_URL};
use ibc_proto::cosmos::base::v1beta1::Coin;
use ibc_proto::cosmos::tx::signing::v1beta1::SignMode;
use ibc_proto::cosmos::tx::v1beta1::mode_info::{Single, Sum};
use ibc_proto::cosmos::tx::v1beta1::{
    AuthInfo, Fee, ModeInfo, SignDoc, SignerInfo, TxBody, TxRaw,
};
use ibc_proto::google::protobuf::Any;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use prost::Message;

use crate::error::{ChainError, HandshakeError};

/// The secp256k1 key of the devnet's test account on one chain.
#[derive(Clone)]
pub struct CosmosSigner {
    address: String,
    key: SigningKey,
}

impl fmt::Debug for CosmosSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl CosmosSigner {
    /// Derives the key at `hd_path` from a BIP-39 mnemonic with an empty passphrase.
    pub fn from_mnemonic(
        chain_id: &str,
        address: impl Into<String>,
        mnemonic: &str,
        hd_path: &str,
    ) -> Result<Self, ChainError> {
        let key_error = |reason: String| ChainError::Key {
            chain_id: chain_id.to_string(),
            reason,
        };

        let mnemonic = Mnemonic::parse_normalized(mnemonic).map_err(|e| key_error(e.to_string()))?;
        let path = DerivationPath::from_str(hd_path).map_err(|e| key_error(e.to_string()))?;
        let xprv = XPrv::derive_from_path(mnemonic.to_seed(""), &path)
            .map_err(|e| key_error(e.to_string()))?;

        Ok(Self {
            address: address.into(),
            key: xprv.private_key().clone(),
        })
    }

    pub fn from_account(
        chain_id: &str,
        account: &AccountRecord,
        config: &TxConfig,
    ) -> Result<Self, HandshakeError> {
        let mnemonic = account
            .mnemonic
            .as_deref()
            .ok_or_else(|| DevnetError::MissingMnemonic {
                chain_id: chain_id.to_string(),
                account: account.name.clone(),
            })?;

        Ok(Self::from_mnemonic(
            chain_id,
            account.address.clone(),
            mnemonic,
            &config.hd_path,
        )?)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Compressed SEC1 encoding of the public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Builds a `TxRaw` carrying `messages`, signed in direct mode for the given account state.
    pub fn sign_tx(
        &self,
        chain_id: &str,
        account_number: u64,
        sequence: u64,
        messages: Vec<Any>,
        config: &TxConfig,
    ) -> TxRaw {
        let body = TxBody {
            messages,
            memo: config.memo.clone(),
            ..Default::default()
        };

        let signer_info = SignerInfo {
            public_key: Some(Any {
                type_url: SECP256K1_PUB_KEY_TYPE_URL.to_string(),
                value: PubKey {
                    key: self.public_key(),
                }
                .encode_to_vec(),
            }),
            mode_info: Some(ModeInfo {
                sum: Some(Sum::Single(Single {
                    mode: SignMode::Direct as i32,
                })),
            }),
            sequence,
        };

        let auth_info = AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(Fee {
                amount: vec![Coin {
                    denom: config.fee_denom.clone(),
                    amount: config.fee_amount.to_string(),
                }],
                gas_limit: config.gas_limit,
                ..Default::default()
            }),
            ..Default::default()
        };

        let body_bytes = body.encode_to_vec();
        let auth_info_bytes = auth_info.encode_to_vec();

        let sign_doc = SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: chain_id.to_string(),
            account_number,
        };
        let signature: Signature = self.key.sign(&sign_doc.encode_to_vec());

        TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature.to_bytes().to_vec()],
        }
    }
}
