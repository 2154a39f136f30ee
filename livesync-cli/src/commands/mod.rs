pub mod completion;
pub mod config;
pub mod follow;
pub mod messages;
pub mod render;

use shared::{
    config::server::Config,
    models::{SenderProfile, SenderRole},
};

use crate::client::ApiClient;

/// Resolved connection settings shared by the networked commands.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub server: String,
    pub token: Option<String>,
}

impl Context {
    /// Command-line values win over the configuration file and environment.
    pub fn new(config: Config, server: Option<String>, token: Option<String>) -> Self {
        let server = server.unwrap_or_else(|| config.server.public_base_url.clone());
        let token = token.or_else(|| config.auth.bearer_token.clone());
        Self {
            config,
            server,
            token,
        }
    }

    pub fn api(&self) -> anyhow::Result<ApiClient> {
        ApiClient::new(&self.server, self.token.clone(), self.config.sync.page_size)
    }
}

pub fn parse_role(value: &str) -> Result<SenderRole, String> {
    SenderRole::try_from(value.to_ascii_lowercase().as_str())
        .map_err(|_| format!("unknown role '{value}'; use mentor, participant or admin"))
}

/// Builds the denormalized profile attached to outgoing messages.
pub fn sender_profile(name: Option<String>, role: SenderRole) -> Option<SenderProfile> {
    name.map(|display_name| SenderProfile { display_name, role })
}
