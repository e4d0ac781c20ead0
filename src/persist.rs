use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::cropper::CroppedVolume;
use crate::error::{ReconstructionError, Result};

/// Writes reconstructed slices as `{index:03}.npy` files of `i16`
pub struct SliceWriter;

impl SliceWriter {
    /// Destination of a scan: its path with the last `source_marker` component
    /// replaced by `output_marker`.
    ///
    /// Fails when the marker is missing, since the destination would otherwise
    /// be the source directory itself.
    pub fn output_dir(scan: &Path, source_marker: &str, output_marker: &str) -> Result<PathBuf> {
        let components: Vec<Component> = scan.components().collect();
        let position = components
            .iter()
            .rposition(|c| c.as_os_str() == source_marker)
            .ok_or_else(|| {
                ReconstructionError::io(
                    scan,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path has no '{source_marker}' component"),
                    ),
                )
            })?;

        let mut output = PathBuf::new();
        for (i, component) in components.iter().enumerate() {
            if i == position {
                output.push(output_marker);
            } else {
                output.push(component.as_os_str());
            }
        }
        Ok(output)
    }

    /// Sibling directory slices are written to before being published
    pub fn staging_dir(dest: &Path) -> PathBuf {
        let mut name = dest
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".partial");
        dest.with_file_name(name)
    }

    /// Removes any earlier output of a scan, published or not
    pub fn clear(dest: &Path) -> Result<()> {
        for dir in [dest.to_path_buf(), Self::staging_dir(dest)] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!("removed {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ReconstructionError::io(dir, e)),
            }
        }
        Ok(())
    }

    /// Writes every slice into the staging directory, then renames it to `dest`.
    ///
    /// Returns the number of slices written.
    pub fn persist(volume: &CroppedVolume, dest: &Path) -> Result<usize> {
        let staging = Self::staging_dir(dest);
        Self::clear(dest)?;
        fs::create_dir_all(&staging).map_err(|e| ReconstructionError::io(&staging, e))?;

        let mut written = 0;
        for (index, slice) in volume.volume().to_i16_slices().enumerate() {
            let path = staging.join(format!("{index:03}.npy"));
            ndarray_npy::write_npy(&path, &slice)
                .map_err(|source| ReconstructionError::Npy { path, source })?;
            written += 1;
        }

        fs::rename(&staging, dest).map_err(|e| ReconstructionError::io(dest, e))?;
        Ok(written)
    }
}
