use slateos_abi::PhysAddr;
use slateos_lib::testing::TestResult;
use slateos_lib::{assert_eq_test, assert_some, assert_test, define_test_suite, pass};

use crate::direct_map::PhysAddrDirectMap;
use crate::frame_alloc::{
    FREE_POISON, FRESH_POISON, alloc_page_frame, alloc_zeroed_page_frame, frame_alloc_stats,
    free_page_frame, page_frame_inc_share, page_frame_set_share, page_frame_share_count,
};
use crate::mm_constants::PAGE_SIZE_4KB;
use crate::test_fixtures::ensure_frame_alloc;

fn frame_byte(pa: PhysAddr, offset: usize) -> u8 {
    // SAFETY: the test owns (or just released) the frame and the direct map
    // covers it.
    unsafe { pa.to_virt().as_ptr::<u8>().add(offset).read() }
}

/// Alloc shrinks the free list by one, free restores it.
pub fn test_frame_alloc_free_cycle() -> TestResult {
    ensure_frame_alloc();

    let before = frame_alloc_stats().free_frames;
    let pa = assert_some!(alloc_page_frame(), "allocate a frame");
    assert_eq_test!(
        frame_alloc_stats().free_frames,
        before - 1,
        "alloc takes one frame off the list"
    );

    free_page_frame(pa);
    assert_eq_test!(
        frame_alloc_stats().free_frames,
        before,
        "free returns the frame"
    );
    pass!()
}

pub fn test_frame_alloc_alignment() -> TestResult {
    ensure_frame_alloc();

    let pa = assert_some!(alloc_page_frame(), "allocate a frame");
    assert_test!(pa.is_aligned(PAGE_SIZE_4KB), "frame is page aligned");
    assert_eq_test!(page_frame_share_count(pa), 1, "fresh frame has one owner");
    free_page_frame(pa);
    pass!()
}

/// The copy-on-write sharing sequence: two owners, two frees.
pub fn test_frame_share_cow() -> TestResult {
    ensure_frame_alloc();

    let pa = assert_some!(alloc_page_frame(), "allocate a frame");
    page_frame_inc_share(pa);
    assert_eq_test!(page_frame_share_count(pa), 2, "incremented share count");

    let listed = frame_alloc_stats().free_frames;
    free_page_frame(pa);
    assert_eq_test!(page_frame_share_count(pa), 1, "first free drops one owner");
    assert_eq_test!(
        frame_alloc_stats().free_frames,
        listed,
        "shared frame stays off the list"
    );

    free_page_frame(pa);
    assert_eq_test!(page_frame_share_count(pa), 0, "terminal free zeroes count");
    assert_eq_test!(
        frame_alloc_stats().free_frames,
        listed + 1,
        "terminal free returns the frame"
    );
    pass!()
}

/// Fresh frames carry the alloc fill, freed frames the free fill (past the
/// intrusive link word).
pub fn test_frame_poison_patterns() -> TestResult {
    ensure_frame_alloc();

    let pa = assert_some!(alloc_page_frame(), "allocate a frame");
    for offset in [0usize, 7, 64, PAGE_SIZE_4KB as usize - 1] {
        assert_eq_test!(frame_byte(pa, offset), FRESH_POISON, "fresh fill");
    }

    free_page_frame(pa);
    for offset in [16usize, 64, PAGE_SIZE_4KB as usize - 1] {
        assert_eq_test!(frame_byte(pa, offset), FREE_POISON, "free fill");
    }

    // LIFO list: the next allocation hands the same frame back, re-poisoned.
    let again = assert_some!(alloc_page_frame(), "reallocate");
    assert_eq_test!(again, pa, "LIFO reuse of the freed frame");
    assert_eq_test!(frame_byte(again, 0), FRESH_POISON, "link word re-poisoned");
    free_page_frame(again);
    pass!()
}

pub fn test_frame_alloc_zeroed() -> TestResult {
    ensure_frame_alloc();

    let pa = assert_some!(alloc_zeroed_page_frame(), "allocate zeroed frame");
    for offset in [0usize, 1, 64, PAGE_SIZE_4KB as usize - 1] {
        assert_eq_test!(frame_byte(pa, offset), 0, "zeroed content");
    }
    free_page_frame(pa);
    pass!()
}

pub fn test_frame_set_share() -> TestResult {
    ensure_frame_alloc();

    let pa = assert_some!(alloc_page_frame(), "allocate a frame");
    page_frame_set_share(pa, 5);
    assert_eq_test!(page_frame_share_count(pa), 5, "set_share overwrites");
    page_frame_set_share(pa, 1);
    free_page_frame(pa);
    assert_eq_test!(page_frame_share_count(pa), 0, "freed after reset");
    pass!()
}

define_test_suite!(
    frame_alloc,
    [
        test_frame_alloc_free_cycle,
        test_frame_alloc_alignment,
        test_frame_share_cow,
        test_frame_poison_patterns,
        test_frame_alloc_zeroed,
        test_frame_set_share,
    ]
);
