use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use ibc_core_host_types::identifiers::ConnectionId;
use ibc_devnet_types::config::RelayerDriverConfig;
use ibc_devnet_types::msgs::join_connection_hops;
use ibc_devnet_types::relayer::{
    PathConfig, PathName, RelayerChainConfig, RelayerConfig, RelayerIdentity, RelayerRole,
};
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::RelayerError;
use crate::relayer::{ChannelOpenRequest, Relayer, RelayerLauncher};

const CONFIG_FILE: &str = "config.json";

/// Drives a relayer binary with one subcommand per call.
///
/// The relayer reads its configuration from `config.json` in its home directory; this driver
/// owns that file and rewrites it before every subcommand that depends on it.
pub struct ExecRelayer {
    driver: RelayerDriverConfig,
    identity: Mutex<RelayerIdentity>,
    child: Mutex<Option<Child>>,
}

impl ExecRelayer {
    pub fn new(driver: RelayerDriverConfig, identity: RelayerIdentity) -> Self {
        Self {
            driver,
            identity: Mutex::new(identity),
            child: Mutex::new(None),
        }
    }

    fn name(&self) -> String {
        self.identity.lock().name.clone()
    }

    fn config_file(&self) -> PathBuf {
        self.driver.home.join(CONFIG_FILE)
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.driver.binary);
        command
            .args(&self.driver.extra_args)
            .arg("--home")
            .arg(&self.driver.home)
            .args(args);
        command
    }

    /// Runs one subcommand to completion.
    async fn run(&self, args: Vec<String>) -> Result<(), RelayerError> {
        let relayer = self.name();
        let rendered = args.join(" ");
        debug!(%relayer, command = %rendered, "running relayer command");

        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RelayerError::Spawn {
                relayer: relayer.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RelayerError::CommandFailed {
                relayer,
                command: rendered,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// Whether process `pid` is still alive: asked of the child handle when this driver spawned
    /// it, of `kill -0` for a pid recorded by an earlier run.
    async fn is_running(&self, pid: u32) -> Result<bool, RelayerError> {
        {
            let mut child = self.child.lock();
            if let Some(child) = child.as_mut().filter(|c| c.id() == Some(pid)) {
                return Ok(matches!(child.try_wait(), Ok(None)));
            }
        }

        let status = Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| RelayerError::Spawn {
                relayer: self.name(),
                source,
            })?;

        Ok(status.success())
    }

    /// Applies `change` to the recorded configuration and writes the result out.
    async fn rewrite_config<F>(&self, change: F) -> Result<(), RelayerError>
    where
        F: FnOnce(&mut RelayerConfig) -> Result<(), RelayerError>,
    {
        let (relayer, config) = {
            let mut identity = self.identity.lock();
            change(&mut identity.configuration)?;
            (identity.name.clone(), identity.configuration.clone())
        };

        let file = self.config_file();
        let config_io = |source| RelayerError::ConfigIo {
            relayer: relayer.clone(),
            file: file.clone(),
            source,
        };

        let raw = serde_json::to_vec_pretty(&config).map_err(|source| {
            RelayerError::InvalidConfig {
                relayer: relayer.clone(),
                source,
            }
        })?;

        tokio::fs::create_dir_all(&self.driver.home)
            .await
            .map_err(config_io)?;
        tokio::fs::write(&file, raw).await.map_err(config_io)?;

        Ok(())
    }
}

#[async_trait]
impl Relayer for ExecRelayer {
    fn identity(&self) -> RelayerIdentity {
        self.identity.lock().clone()
    }

    async fn init(
        &self,
        chains: Vec<RelayerChainConfig>,
        paths: Vec<(PathName, PathConfig)>,
    ) -> Result<(), RelayerError> {
        self.rewrite_config(|config| {
            for chain in chains {
                config.chains.insert(chain.chain_id.clone(), chain);
            }
            config.paths.extend(paths);
            Ok(())
        })
        .await?;

        self.run(vec!["init".to_string()]).await
    }

    async fn delete_path(&self, path: &PathName) -> Result<(), RelayerError> {
        self.rewrite_config(|config| {
            config.paths.remove(path);
            Ok(())
        })
        .await?;

        self.run(vec![
            "paths".to_string(),
            "delete".to_string(),
            path.to_string(),
        ])
        .await
    }

    async fn connect(&self, paths: &[PathName]) -> Result<(), RelayerError> {
        let mut args = vec!["connect".to_string()];
        args.extend(paths.iter().map(ToString::to_string));

        self.run(args).await
    }

    async fn start(&self) -> Result<(), RelayerError> {
        let (relayer, running) = {
            let identity = self.identity.lock();
            (identity.name.clone(), identity.process_id)
        };

        if let Some(pid) = running {
            if self.is_running(pid).await? {
                debug!(%relayer, pid, "relayer already running");
                return Ok(());
            }
            warn!(%relayer, pid, "recorded relayer process is gone, starting it again");
        }

        let child = self
            .command(["start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RelayerError::Spawn {
                relayer: relayer.clone(),
                source,
            })?;

        let pid = child.id();
        self.identity.lock().process_id = pid;
        *self.child.lock() = Some(child);
        info!(%relayer, ?pid, "relayer started");

        Ok(())
    }

    async fn channel(&self, request: &ChannelOpenRequest) -> Result<(), RelayerError> {
        let mut args = vec![
            "channel".to_string(),
            request.path.to_string(),
            "--receiver".to_string(),
            request.receiver.clone(),
            "--version".to_string(),
            request.version.to_string(),
            "--order".to_string(),
            request.ordering.as_str().to_string(),
            "--connection-hops".to_string(),
            join_connection_hops(&request.connection_hops),
            "--counterparty-port".to_string(),
            request.counterparty_port_id.to_string(),
        ];

        if let Some(channel_id) = &request.counterparty_channel_id {
            args.push("--counterparty-channel".to_string());
            args.push(channel_id.to_string());
        }

        self.run(args).await
    }

    async fn update(
        &self,
        path: &PathName,
        connection_hops: &[ConnectionId],
    ) -> Result<(), RelayerError> {
        let relayer = self.name();

        self.rewrite_config(|config| {
            let entry = config
                .paths
                .get_mut(path)
                .ok_or_else(|| RelayerError::UnknownPath {
                    relayer,
                    path: path.clone(),
                })?;
            entry.connection_hops = connection_hops.to_vec();
            Ok(())
        })
        .await?;

        self.run(vec![
            "paths".to_string(),
            "update".to_string(),
            path.to_string(),
            "--connection-hops".to_string(),
            join_connection_hops(connection_hops),
        ])
        .await
    }

    async fn config(&self) -> Result<RelayerConfig, RelayerError> {
        let file = self.config_file();

        match tokio::fs::read(&file).await {
            Ok(raw) => {
                let config: RelayerConfig =
                    serde_json::from_slice(&raw).map_err(|source| RelayerError::InvalidConfig {
                        relayer: self.name(),
                        source,
                    })?;
                self.identity.lock().configuration = config.clone();
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(self.identity.lock().configuration.clone())
            }
            Err(source) => Err(RelayerError::ConfigIo {
                relayer: self.name(),
                file,
                source,
            }),
        }
    }
}

/// Launches one [`ExecRelayer`] per role from the configured drivers.
#[derive(Clone, Debug, Default)]
pub struct ExecLauncher {
    drivers: BTreeMap<RelayerRole, RelayerDriverConfig>,
}

impl ExecLauncher {
    pub fn new(drivers: BTreeMap<RelayerRole, RelayerDriverConfig>) -> Self {
        Self { drivers }
    }

    pub fn with_driver(mut self, role: RelayerRole, driver: RelayerDriverConfig) -> Self {
        self.drivers.insert(role, driver);
        self
    }
}

#[async_trait]
impl RelayerLauncher for ExecLauncher {
    async fn launch(
        &self,
        role: RelayerRole,
        existing: Option<&RelayerIdentity>,
    ) -> Result<Arc<dyn Relayer>, RelayerError> {
        let driver = self
            .drivers
            .get(&role)
            .ok_or(RelayerError::MissingDriver { role })?;

        let identity = existing
            .cloned()
            .unwrap_or_else(|| RelayerIdentity::new(role));

        Ok(Arc::new(ExecRelayer::new(driver.clone(), identity)))
    }
}

#[cfg(test)]
mod tests {
    use ibc_devnet_types::path::{Path, PathEnd};

    use super::*;

    fn home(test: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ibc-devnet-{test}-{}", std::process::id()))
    }

    fn relayer(binary: &str, test: &str) -> ExecRelayer {
        let driver = RelayerDriverConfig::builder()
            .binary(binary)
            .home(home(test))
            .build();

        ExecRelayer::new(driver, RelayerIdentity::new(RelayerRole::VIbc))
    }

    /// Above the largest pid Linux hands out.
    const GONE_PID: u32 = 4_194_305;

    fn running_as(relayer: ExecRelayer, pid: u32) -> ExecRelayer {
        relayer.identity.lock().process_id = Some(pid);
        relayer
    }

    fn path_config() -> (PathName, PathConfig) {
        let path = Path::direct(PathEnd::new("polymer"), PathEnd::new("eth"));
        (PathName::between("polymer", "eth"), PathConfig::new(path))
    }

    #[test_log::test(tokio::test)]
    async fn init_writes_the_configuration_file() {
        let relayer = relayer("true", "init");

        relayer
            .init(vec![], vec![path_config()])
            .await
            .expect("init succeeds");

        let written = relayer.config().await.expect("readable");
        assert!(written.paths.contains_key(&PathName::between("polymer", "eth")));
        assert_eq!(relayer.identity().configuration, written);
    }

    #[test_log::test(tokio::test)]
    async fn update_needs_a_known_path() {
        let relayer = relayer("true", "update");
        let hops: [ConnectionId; 1] = ["connection-0".parse().expect("valid connection id")];

        let err = relayer
            .update(&PathName::from("polymer-eth"), &hops)
            .await
            .expect_err("unknown path");
        assert!(matches!(err, RelayerError::UnknownPath { .. }));

        relayer
            .init(vec![], vec![path_config()])
            .await
            .expect("init succeeds");
        relayer
            .update(&PathName::from("polymer-eth"), &hops)
            .await
            .expect("known path");

        let config = relayer.config().await.expect("readable");
        assert_eq!(
            config.paths[&PathName::from("polymer-eth")].connection_hops,
            hops
        );
    }

    #[test_log::test(tokio::test)]
    async fn failing_commands_surface_their_exit_code() {
        let relayer = relayer("false", "failing");

        let err = relayer
            .connect(&[PathName::from("polymer-eth")])
            .await
            .expect_err("false always fails");

        assert!(matches!(
            err,
            RelayerError::CommandFailed { code: Some(1), command, .. } if command == "connect polymer-eth"
        ));
    }

    #[test_log::test(tokio::test)]
    async fn a_live_relayer_is_not_started_again() {
        let pid = std::process::id();
        let relayer = running_as(relayer("true", "live"), pid);

        relayer.start().await.expect("nothing to start");

        assert_eq!(relayer.identity().process_id, Some(pid));
    }

    #[test_log::test(tokio::test)]
    async fn a_relayer_whose_process_is_gone_is_restarted() {
        let relayer = running_as(relayer("true", "gone"), GONE_PID);

        relayer.start().await.expect("restarted");

        let pid = relayer.identity().process_id;
        assert!(pid.is_some());
        assert_ne!(pid, Some(GONE_PID));
    }

    #[test_log::test(tokio::test)]
    async fn launcher_needs_a_driver_per_role() {
        let launcher = ExecLauncher::default().with_driver(
            RelayerRole::Eth2,
            RelayerDriverConfig::builder()
                .binary("true")
                .home(home("launcher"))
                .build(),
        );

        let relayer = launcher
            .launch(RelayerRole::Eth2, None)
            .await
            .expect("driver configured");
        assert_eq!(relayer.identity().role, RelayerRole::Eth2);

        assert!(matches!(
            launcher.launch(RelayerRole::Ibc, None).await,
            Err(RelayerError::MissingDriver { role: RelayerRole::Ibc })
        ));
    }
}
