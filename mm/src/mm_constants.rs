/// Size of one physical page frame.
pub const PAGE_SIZE_4KB: u64 = 4096;

/// Capacity of the share-count table, and therefore the largest physical
/// range `frame_alloc_init` accepts (32768 frames = 128 MiB).
pub const MAX_PHYS_FRAMES: usize = 32768;
