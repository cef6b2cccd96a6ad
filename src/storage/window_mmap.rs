use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::PathBuf;

/// A memory-mapped arena of `f64` cells holding the window rows back to back.
///
/// Anonymous maps and freshly truncated files both start zeroed, so a new arena
/// is a window of all-zero rows.
pub(crate) struct WindowMmap {
    mmap: MmapMut,
}

impl WindowMmap {
    /// CREATE: Maps `cells` zeroed values, file-backed when `path` is given.
    pub(crate) fn new(path: Option<PathBuf>, cells: usize) -> Result<Self, std::io::Error> {
        let total_size = cells * size_of::<f64>();
        let mmap = if let Some(p) = &path {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(p)?;

            file.set_len(total_size as u64)?;
            unsafe { MmapOptions::new().map_mut(&file)? }
        } else {
            MmapOptions::new().len(total_size).map_anon()?
        };

        Ok(Self { mmap })
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[f64] {
        // Maps are page aligned and sized to a whole number of cells.
        bytemuck::cast_slice(&self.mmap[..])
    }

    #[inline(always)]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        bytemuck::cast_slice_mut(&mut self.mmap[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_anonymous_is_zeroed() {
        let arena = WindowMmap::new(None, 16).unwrap();
        assert_eq!(arena.as_slice().len(), 16);
        assert!(arena.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_write_and_read_cells() {
        let mut arena = WindowMmap::new(None, 4).unwrap();
        arena.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(arena.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_file_backed() {
        let path = std::env::temp_dir().join(format!("test_window_{}.mmap", std::process::id()));
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }

        {
            let mut arena = WindowMmap::new(Some(path.clone()), 8).unwrap();
            arena.as_mut_slice()[7] = 42.5;
            arena.mmap.flush().unwrap();
        }

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8 * size_of::<f64>());
        let last: [u8; 8] = bytes[56..64].try_into().unwrap();
        assert_eq!(f64::from_ne_bytes(last), 42.5);

        let _ = std::fs::remove_file(&path);
    }
}
