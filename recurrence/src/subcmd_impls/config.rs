use clap::Args;
use mri_prep::prelude::{PipelineConfig, Result};

#[derive(Args, Debug)]
pub struct ShowConfig {}

impl ShowConfig {
    pub fn run(&self, config: &PipelineConfig) -> Result<()> {
        print!("{}", config.to_toml()?);
        Ok(())
    }
}
