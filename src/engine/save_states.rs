use super::config_engine::{LOCAL_STORAGE_DIR, SAVE_STATE_FILENAME_CAMERA};
use crate::{
    config::{PRECURSOR_BYTES, PRECURSOR_BYTE_COUNT},
    helper::more_errors::IoError,
    user_interface::camera::Camera,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ~~ Public ~~

pub fn save_state_camera(camera: &Camera) -> Result<(), IoError> {
    save_state(camera, Path::new(LOCAL_STORAGE_DIR), SAVE_STATE_FILENAME_CAMERA)
}

pub fn load_state_camera() -> Result<Camera, IoError> {
    load_state::<Camera>(Path::new(LOCAL_STORAGE_DIR), SAVE_STATE_FILENAME_CAMERA)
}

// ~~ Private ~~

fn save_state(to_serialize: &impl Serialize, dir: &Path, file_name: &str) -> Result<(), IoError> {
    let encoded_bytes = bincode::serialize(to_serialize).map_err(IoError::SerializeFailed)?;
    save_state_bytes(dir, file_name, encoded_bytes)
}

fn save_state_bytes(dir: &Path, file_name: &str, mut encoded_bytes: Vec<u8>) -> Result<(), IoError> {
    // prepend encoded bytes with engine info
    let mut write_bytes = PRECURSOR_BYTES.to_vec();
    write_bytes.append(&mut encoded_bytes);

    let file_path = validated_file_path(dir, file_name)?;
    fs::write(&file_path, write_bytes).map_err(|e| {
        let file_path_string = file_path.to_str().unwrap_or(file_name).to_string();
        IoError::WriteFileFailed(file_path_string, e)
    })?;
    Ok(())
}

fn load_state<T>(dir: &Path, file_name: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    let encoded_bytes = load_state_bytes(dir, file_name)?;
    bincode::deserialize::<T>(&encoded_bytes).map_err(IoError::DeserializeFailed)
}

fn load_state_bytes(dir: &Path, file_name: &str) -> Result<Vec<u8>, IoError> {
    let file_path = validated_file_path(dir, file_name)?;
    let file_path_string = file_path.to_str().unwrap_or(file_name).to_string();

    let mut read_bytes = fs::read(&file_path)
        .map_err(|io_error| IoError::read_file_error(io_error, file_path_string.clone()))?;

    if !read_bytes.starts_with(&PRECURSOR_BYTES) {
        return Err(IoError::InvalidPrecursor(file_path_string));
    }
    read_bytes.drain(0..PRECURSOR_BYTE_COUNT);
    Ok(read_bytes)
}

/// Ensures containing directories exist, but not the actual file
fn validated_file_path(dir: &Path, file_name: &str) -> Result<PathBuf, IoError> {
    fs::create_dir_all(dir).map_err(|e| {
        IoError::CreateDirectoryFailed(dir.to_string_lossy().into_owned(), e)
    })?;
    Ok(dir.join(file_name))
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;
    use std::env;

    fn test_dir(name: &str) -> PathBuf {
        env::temp_dir().join(format!("vulkan-renderer-{}-{}", name, std::process::id()))
    }

    #[test]
    fn camera_save_and_load() {
        let dir = test_dir("camera");
        let mut saved_camera = Camera::new([1920., 1080.]);
        saved_camera.rotate(DVec2::new(40., -12.));
        saved_camera.scroll_zoom(2.);

        save_state(&saved_camera, &dir, SAVE_STATE_FILENAME_CAMERA).unwrap();
        let loaded_camera: Camera = load_state(&dir, SAVE_STATE_FILENAME_CAMERA).unwrap();
        assert_eq!(saved_camera, loaded_camera);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn written_file_starts_with_precursor() {
        let dir = test_dir("precursor");
        save_state(&Camera::default(), &dir, "_testing.vkrsave").unwrap();

        let bytes = fs::read(dir.join("_testing.vkrsave")).unwrap();
        assert_eq!(&bytes[..PRECURSOR_BYTE_COUNT], &PRECURSOR_BYTES);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = test_dir("foreign");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("_foreign.vkrsave"), b"GSH1 not ours").unwrap();

        let res = load_state::<Camera>(&dir, "_foreign.vkrsave");
        assert!(matches!(res, Err(IoError::InvalidPrecursor(_))));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = test_dir("missing");
        let res = load_state::<Camera>(&dir, "_missing.vkrsave");
        assert!(matches!(res, Err(IoError::FileNotFound(_))));

        let _ = fs::remove_dir_all(dir);
    }
}
