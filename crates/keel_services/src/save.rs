//! World snapshots on disk.
//!
//! Saves go to a sibling temporary file that is renamed over the target once
//! fully written, so an interrupted save never leaves a truncated snapshot.

use keel_core::snapshot::{self, LoadSummary, SnapshotError};
use keel_core::world::World;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SaveError + '_ {
    move |source| SaveError::Io {
        path: path.to_owned(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_snapshot(world: &World, temp: &Path) -> Result<(), SaveError> {
    let file = File::create(temp).map_err(io_error(temp))?;
    let mut out = BufWriter::new(file);
    snapshot::write_world(world, &mut out)?;
    out.flush().map_err(io_error(temp))?;
    out.get_ref().sync_all().map_err(io_error(temp))
}

/// Write a snapshot of `world` to `path`, replacing any previous file.
pub fn save_world(world: &World, path: impl AsRef<Path>) -> Result<(), SaveError> {
    let path = path.as_ref();
    let temp = temp_path(path);

    if let Err(err) = write_snapshot(world, &temp) {
        let _ = std::fs::remove_file(&temp);
        return Err(err);
    }

    std::fs::rename(&temp, path).map_err(io_error(path))?;
    tracing::info!(world = world.name(), path = %path.display(), "world saved");
    Ok(())
}

/// Load the snapshot at `path` into `world`, which must be empty.
pub fn load_world(world: &mut World, path: impl AsRef<Path>) -> Result<LoadSummary, SaveError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    let summary = snapshot::read_world(world, BufReader::new(file))?;
    tracing::info!(
        world = world.name(),
        path = %path.display(),
        objects = summary.objects,
        components = summary.components,
        "world loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::math::Vec3;
    use keel_core::world::{Component, ObjectDesc, TypeRegistry, WorldDesc};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Beacon {
        range: f32,
    }

    impl Component for Beacon {
        const TYPE_NAME: &'static str = "beacon";
    }

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry.register_serializable_component::<Beacon>().unwrap();
        Arc::new(registry)
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.snapshot");
        let registry = registry();

        let mut world = World::new(WorldDesc::new("disk"), registry.clone()).unwrap();
        let tower = world
            .create_object(ObjectDesc::new("tower").with_position(Vec3::new(4.0, 0.0, 2.0)))
            .unwrap();
        let beacon = world.create_component(tower, Beacon { range: 12.5 }).unwrap();
        save_world(&world, &path).unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let mut loaded = World::new(WorldDesc::new("disk"), registry).unwrap();
        let summary = load_world(&mut loaded, &path).unwrap();
        assert_eq!(summary.objects, 1);
        assert_eq!(loaded.component::<Beacon>(beacon), Some(&Beacon { range: 12.5 }));
        assert_eq!(
            loaded.local_transform(tower).map(|t| t.position),
            Some(Vec3::new(4.0, 0.0, 2.0))
        );
    }

    #[test]
    fn saving_twice_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.snapshot");
        let mut world = World::new(WorldDesc::new("disk"), registry()).unwrap();

        save_world(&world, &path).unwrap();
        let empty_len = std::fs::metadata(&path).unwrap().len();
        world.create_object(ObjectDesc::new("added")).unwrap();
        save_world(&world, &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > empty_len);
    }

    #[test]
    fn missing_snapshot_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.snapshot");
        let mut world = World::new(WorldDesc::new("disk"), registry()).unwrap();
        match load_world(&mut world, &path) {
            Err(SaveError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected an i/o error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.snapshot");
        std::fs::write(&path, b"KEEL").unwrap();
        let mut world = World::new(WorldDesc::new("disk"), registry()).unwrap();
        assert!(matches!(
            load_world(&mut world, &path),
            Err(SaveError::Snapshot(SnapshotError::Io(_)))
        ));
    }
}
