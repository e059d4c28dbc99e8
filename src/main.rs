use anyhow::Result;
use clap::Parser;
use particle_mirror::logging::{self, LogTarget};

fn main() -> Result<()> {
    let cfg = particle_mirror::config::Config::parse();
    if cfg.list_devices {
        particle_mirror::audio::list_input_devices()?;
        particle_mirror::camera::list_cameras()?;
        return Ok(());
    }

    let target = match cfg.log_file.clone().or_else(logging::default_log_path) {
        Some(path) => LogTarget::File(path),
        None => LogTarget::Discard,
    };
    logging::init(&cfg.log_level, target)?;

    particle_mirror::app::run(cfg)
}
