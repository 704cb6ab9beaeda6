//! Opening the simulated device behind an image file

use crate::error::{CliError, Result};
use norfvb_core::config::PlatformConfig;
use norfvb_core::{FlashFvb, NorFlashEngine};
use norfvb_sim::SimController;
use std::fs;
use std::path::Path;

/// Load the platform configuration, falling back to the built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<PlatformConfig> {
    match path {
        Some(path) => {
            let config = PlatformConfig::from_toml_file(path)?;
            log::info!("Loaded platform configuration from {:?}", path);
            Ok(config)
        }
        None => Ok(PlatformConfig::default()),
    }
}

/// Bring up the block facade over a simulator seeded from `image`
///
/// A missing image starts out fully erased. A short image is padded with
/// erased bytes.
pub fn open_fvb(image: &Path, config: PlatformConfig) -> Result<FlashFvb<SimController>> {
    let sim = if image.exists() {
        let data = fs::read(image)?;
        let sim = SimController::new(&config);
        if data.len() > sim.data().len() {
            return Err(CliError::ImageTooLarge {
                path: image.display().to_string(),
                expected: sim.data().len(),
                actual: data.len(),
            });
        }
        log::debug!("Loaded {} bytes from {:?}", data.len(), image);
        SimController::with_data(&config, &data)
    } else {
        log::info!("Image {:?} not found, starting with an erased chip", image);
        SimController::new(&config)
    };

    Ok(FlashFvb::new(NorFlashEngine::new(sim, config))?)
}

/// Write the simulated chip contents back to `image`
pub fn save_image(fvb: &FlashFvb<SimController>, image: &Path) -> Result<()> {
    let data = fvb.engine().bus().data();
    fs::write(image, data)?;
    log::debug!("Saved {} bytes to {:?}", data.len(), image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use norfvb_core::fvb::EraseRange;

    fn small_config() -> PlatformConfig {
        PlatformConfig {
            region_size: 4 * 64 * 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_image_is_erased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        let mut fvb = open_fvb(&path, small_config()).unwrap();
        let mut buf = [0u8; 8];
        fvb.read(3, 0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);
    }

    #[test]
    fn test_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        fs::write(&path, vec![0u8; 64 * 1024]).unwrap();

        let mut fvb = open_fvb(&path, small_config()).unwrap();
        fvb.erase_blocks(&[EraseRange::new(0, 1)]).unwrap();
        fvb.write(0, 0, b"NVAR").unwrap();
        save_image(&fvb, &path).unwrap();

        let saved = fs::read(&path).unwrap();
        assert_eq!(saved.len(), 4 * 64 * 1024);
        assert_eq!(&saved[..4], b"NVAR");
        assert_eq!(saved[4], 0xFF);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        fs::write(&path, vec![0u8; 5 * 64 * 1024]).unwrap();
        assert!(matches!(
            open_fvb(&path, small_config()),
            Err(CliError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.toml");
        fs::write(&path, "[flash]\nsize = \"1 MiB\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.region_size, 1024 * 1024);
        assert_eq!(load_config(None).unwrap(), PlatformConfig::default());
    }
}
