use super::*;

use crate::config::VerifierConfig;

/// Opens real sessions: NETCONF over SSH and the CLI over telnet.
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    config: VerifierConfig,
}

impl NetworkConnector {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn netconf_options(&self) -> NetconfOptions {
        NetconfOptions {
            host: self.config.host.clone(),
            port: self.config.netconf_port,
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            security: ConnectionSecurityOptions::from(self.config.security),
            connect_timeout: self.config.connect_timeout(),
            timeout: self.config.command_timeout(),
        }
    }
}

#[async_trait]
impl DeviceConnector for NetworkConnector {
    type Model = NetconfSshSession;
    type Cli = TelnetTransport;

    async fn connect_model(
        &mut self,
        transcript: &Transcript,
    ) -> Result<Self::Model, VerifyError> {
        debug!(
            "opening NETCONF session to {}:{}",
            self.config.host, self.config.netconf_port
        );
        NetconfSshSession::connect(self.netconf_options(), transcript.clone()).await
    }

    async fn connect_cli(&mut self) -> Result<Self::Cli, VerifyError> {
        debug!(
            "opening CLI session to {}:{}",
            self.config.host, self.config.cli_port
        );
        TelnetTransport::connect(
            &self.config.host,
            self.config.cli_port,
            self.config.connect_timeout(),
        )
        .await
    }
}
