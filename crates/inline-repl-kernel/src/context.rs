//! The context object handed to constructors.
//!
//! Bundles the language profile, the config manager, and the kernel manager
//! so components receive their collaborators explicitly.

use std::sync::Arc;

use crate::config::{ConfigManager, ReplConfig};
use crate::profile::LanguageProfile;
use crate::session::KernelManager;

#[derive(Debug)]
pub struct ReplContext {
    pub profile: LanguageProfile,
    pub config: ConfigManager,
    pub kernels: Arc<KernelManager>,
}

impl ReplContext {
    pub fn new(profile: LanguageProfile, config: ReplConfig) -> Self {
        let kernels = Arc::new(KernelManager::new(profile.language.clone()));
        Self {
            profile,
            config: ConfigManager::new(config),
            kernels,
        }
    }
}
