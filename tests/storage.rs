use std::path::PathBuf;

use anyhow::Result;
use faceswap::config::{self, Config};
use faceswap::{storage, FaceRegion, Strategy};
use uuid::Uuid;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("faceswap-test-{}", Uuid::new_v4()))
}

#[test]
fn test_region_list_round_trip() -> Result<()> {
    let dir = temp_dir();
    let path = dir.join("regions.txt");

    let mut first = FaceRegion::from_box(10.0, 20.0, 100.0, 120.0);
    first.set_confidence(0.9);
    let mut second = storage::parse_box("200,40,80,80")?;
    second.set_features(vec![0.5, 0.25]);
    storage::save_regions(&path, &[first, second])?;

    let loaded = storage::load_regions(&path)?;
    std::fs::remove_dir_all(&dir)?;

    println!("loaded {} regions", loaded.len());
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].confidence(), 0.9);
    assert_eq!(loaded[0].bounding_box().width, 100.0);
    assert_eq!(loaded[1].confidence(), 1.0);
    assert_eq!(loaded[1].features(), Some(&[0.5, 0.25][..]));
    Ok(())
}

#[test]
fn test_border_check_survives_save() -> Result<()> {
    let dir = temp_dir();
    let path = dir.join("regions.txt");

    let mut regions = vec![
        storage::parse_box("2,2,50,50")?,
        storage::parse_box("100,100,50,50")?,
    ];
    let rejected: Vec<bool> = regions
        .iter_mut()
        .map(|r| r.check_border(300, 300, 0.1))
        .collect();
    assert_eq!(rejected, vec![true, false]);
    storage::save_regions(&path, &regions)?;

    let loaded = storage::load_regions(&path)?;
    std::fs::remove_dir_all(&dir)?;

    assert!(loaded[0].is_out_of_image());
    assert_eq!(loaded[0].confidence(), -1.0);
    assert!(!loaded[1].is_out_of_image());
    Ok(())
}

#[test]
fn test_missing_region_list_is_empty() -> Result<()> {
    let loaded = storage::load_regions(&temp_dir().join("nothing.txt"))?;
    assert!(loaded.is_empty());
    Ok(())
}

#[test]
fn test_config_round_trip() -> Result<()> {
    let dir = temp_dir();
    let path = dir.join("config.toml");

    assert_eq!(config::load_config(Some(&path))?, Config::default());

    let cfg = Config {
        strategy: Strategy::Triangulated,
        detection_threshold: 0.3,
        seamless_iterations: 250,
        ..Config::default()
    };
    config::save_config(&cfg, Some(&path))?;
    let loaded = config::load_config(Some(&path))?;
    std::fs::remove_dir_all(&dir)?;

    assert_eq!(loaded, cfg);
    assert_eq!(loaded.swap_options().strategy, Strategy::Triangulated);
    Ok(())
}
