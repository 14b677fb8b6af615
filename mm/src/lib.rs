#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod direct_map;
pub mod frame_alloc;
pub mod mm_constants;
pub mod test_fixtures;
pub mod tests;

pub use frame_alloc::{
    FrameAllocStats, alloc_page_frame, alloc_zeroed_page_frame, frame_alloc_init,
    frame_alloc_stats, free_page_frame, page_frame_inc_share, page_frame_set_share,
    page_frame_share_count,
};
