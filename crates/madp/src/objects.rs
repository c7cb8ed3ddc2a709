//! Loading, writing and generating the workload's object files.

use crate::AppError;
use bytes::Bytes;
use log::info;
use madp_proto::reassembler::AssembledObject;
use madp_proto::workload::{SizeClass, SourceObject};
use rand::RngCore;
use std::fs;
use std::io;
use std::path::Path;

/// Objects per size class; the workload is `small-0.obj` .. `large-9.obj`.
pub const OBJECTS_PER_CLASS: u16 = 10;

const SMALL_OBJECT_BYTES: usize = 10 * 1024;
const LARGE_OBJECT_BYTES: usize = 512 * 1024;

fn object_path(dir: &Path, size_class: SizeClass, file_id: u16) -> std::path::PathBuf {
    dir.join(format!("{}-{}.obj", size_class.name(), file_id))
}

/// Reads all twenty objects fully into memory, in global send order: the
/// small object of each pair before its large sibling.
pub fn load_objects(dir: &Path) -> Result<Vec<SourceObject>, AppError> {
    let mut objects = Vec::with_capacity(2 * OBJECTS_PER_CLASS as usize);
    for file_id in 0..OBJECTS_PER_CLASS {
        for size_class in [SizeClass::Small, SizeClass::Large] {
            let path = object_path(dir, size_class, file_id);
            let data = fs::read(&path).map_err(|source| AppError::Object {
                path: path.display().to_string(),
                source,
            })?;
            objects.push(SourceObject {
                file_id,
                size_class,
                data: Bytes::from(data),
            });
        }
    }
    Ok(objects)
}

/// Writes one reconstructed object into the output directory.
pub fn write_object(dir: &Path, object: &AssembledObject) -> io::Result<()> {
    fs::write(dir.join(object.file_name()), &object.data)
}

/// Fills the objects directory with randomly generated workload files so a
/// transfer can be run from a clean checkout.
pub fn generate_objects(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|source| AppError::Object {
        path: dir.display().to_string(),
        source,
    })?;
    let mut rng = rand::rng();
    for file_id in 0..OBJECTS_PER_CLASS {
        for (size_class, len) in [
            (SizeClass::Small, SMALL_OBJECT_BYTES),
            (SizeClass::Large, LARGE_OBJECT_BYTES),
        ] {
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            let path = object_path(dir, size_class, file_id);
            fs::write(&path, &data).map_err(|source| AppError::Object {
                path: path.display().to_string(),
                source,
            })?;
        }
    }
    info!(
        "generated {} objects in {}",
        2 * OBJECTS_PER_CLASS,
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_follow_the_naming_convention() {
        let dir = Path::new("/tmp/objects");
        assert_eq!(
            object_path(dir, SizeClass::Small, 3),
            Path::new("/tmp/objects/small-3.obj")
        );
        assert_eq!(
            object_path(dir, SizeClass::Large, 9),
            Path::new("/tmp/objects/large-9.obj")
        );
    }

    #[test]
    fn generate_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("madp-objects-{}", std::process::id()));
        generate_objects(&dir).unwrap();

        let objects = load_objects(&dir).unwrap();
        assert_eq!(objects.len(), 2 * OBJECTS_PER_CLASS as usize);
        // Interleaved order: small-0, large-0, small-1, ...
        assert_eq!(objects[0].size_class, SizeClass::Small);
        assert_eq!(objects[0].file_id, 0);
        assert_eq!(objects[0].data.len(), SMALL_OBJECT_BYTES);
        assert_eq!(objects[1].size_class, SizeClass::Large);
        assert_eq!(objects[1].data.len(), LARGE_OBJECT_BYTES);
        assert_eq!(objects[19].file_id, 9);

        fs::remove_dir_all(&dir).unwrap();
    }
}
