use std::path::PathBuf;

use crate::settings::Settings;

#[derive(Clone)]
pub struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) upload_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
}

impl ServerState {
    pub fn new(settings: Settings) -> Self {
        Self {
            upload_dir: settings.server.upload_dir.clone(),
            output_dir: settings.server.output_dir.clone(),
            settings,
        }
    }
}
