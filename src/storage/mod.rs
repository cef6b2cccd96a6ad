pub(crate) mod window_mmap;
