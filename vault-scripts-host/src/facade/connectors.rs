use crate::host::{Host, HostResult, IconProvider};
use std::sync::Arc;
use vault_scripts_api::Icon;

/// Id of the icon connector
pub const ICONS_CONNECTOR: &str = "icons";

/// Connectors to optional host plugins
#[derive(Clone)]
pub struct Connectors {
    host: Arc<dyn Host>,
}

impl Connectors {
    pub(crate) fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Ids of the connectors whose plugin is available
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.host.icon_provider().is_some() {
            keys.push(ICONS_CONNECTOR);
        }
        keys
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys().contains(&id)
    }

    pub fn get(&self, id: &str) -> Option<Connector> {
        match id {
            ICONS_CONNECTOR => self
                .host
                .icon_provider()
                .map(|provider| Connector::Icons(IconConnector { provider })),
            _ => None,
        }
    }

    pub fn icons(&self) -> Option<IconConnector> {
        match self.get(ICONS_CONNECTOR) {
            Some(Connector::Icons(icons)) => Some(icons),
            None => None,
        }
    }
}

/// A connector to one host plugin
#[derive(Clone)]
pub enum Connector {
    Icons(IconConnector),
}

/// Reads and assigns file and folder icons
#[derive(Clone)]
pub struct IconConnector {
    provider: Arc<dyn IconProvider>,
}

impl IconConnector {
    pub fn icon(&self, path: &str) -> Option<Icon> {
        self.provider.icon(path)
    }

    pub fn set_icon(&self, path: &str, icon: Icon) -> HostResult<()> {
        self.provider.set_icon(path, icon)
    }

    pub fn remove_icon(&self, path: &str) -> HostResult<()> {
        self.provider.remove_icon(path)
    }
}
