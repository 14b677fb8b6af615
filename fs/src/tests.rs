use core::hint::spin_loop;

use slateos_lib::testing::TestResult;
use slateos_lib::{InitFlag, assert_eq_test, assert_test, define_test_suite, fail, pass};

use crate::bcache::{bcache_audit_rings, bcache_init, bcache_is_initialized, bread};
use crate::blockdev::{
    BlockDeviceError, MemoryBlockDevice, blockdev_is_registered, blockdev_register,
};

static MEM_DISK: MemoryBlockDevice = MemoryBlockDevice::new();
static FIXTURE_CLAIM: InitFlag = InitFlag::new();
static USING_MEM_DISK: InitFlag = InitFlag::new();

/// Stand up the cache over the in-memory disk when the kernel has not
/// brought up a real one. Returns false if a real disk is registered, in
/// which case the transfer-counting tests cannot observe the device and
/// skip themselves.
fn ensure_bcache() -> bool {
    if FIXTURE_CLAIM.init_once() {
        if !blockdev_is_registered() {
            blockdev_register(&MEM_DISK);
            USING_MEM_DISK.mark_set();
        }
        if !bcache_is_initialized() {
            bcache_init();
        }
    } else {
        while !bcache_is_initialized() {
            spin_loop();
        }
    }
    USING_MEM_DISK.is_set()
}

/// Read and immediately release a spread of blocks wide enough to recycle
/// every reclaimable slot in the pool.
fn churn_blocks() -> bool {
    for blockno in 64..104u32 {
        match bread(1, blockno) {
            Ok(buf) => buf.release(),
            Err(_) => return false,
        }
    }
    true
}

/// A byte written through the cache is served from memory on re-read, with
/// no second device transfer.
pub fn test_bcache_hit_no_reread() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    let mut buf = match bread(1, 42) {
        Ok(buf) => buf,
        Err(_) => return fail!("initial bread of block 42"),
    };
    buf.data_mut()[0] = 0xAB;
    if buf.write().is_err() {
        return fail!("write-back of block 42");
    }
    buf.release();

    let reads_before = MEM_DISK.read_count();
    let again = match bread(1, 42) {
        Ok(buf) => buf,
        Err(_) => return fail!("re-read of block 42"),
    };
    assert_eq_test!(again.data()[0], 0xAB, "cached byte survives release");
    assert_eq_test!(
        MEM_DISK.read_count(),
        reads_before,
        "hit performs no device read"
    );
    again.release();
    pass!()
}

/// `write` issues exactly one device transfer and the bytes land on disk.
pub fn test_bcache_write_once() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    let mut buf = match bread(1, 56) {
        Ok(buf) => buf,
        Err(_) => return fail!("bread of block 56"),
    };
    buf.data_mut()[7] = 0x5A;

    let writes_before = MEM_DISK.write_count();
    if buf.write().is_err() {
        return fail!("write of block 56");
    }
    assert_eq_test!(
        MEM_DISK.write_count(),
        writes_before + 1,
        "exactly one device write"
    );
    assert_eq_test!(MEM_DISK.block_byte(56, 7), 0x5A, "content reached the disk");
    buf.release();
    pass!()
}

/// Repeated acquire/release of one block must not consume pool slots.
pub fn test_bcache_release_cycle() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    for _ in 0..100 {
        match bread(1, 55) {
            Ok(buf) => buf.release(),
            Err(_) => return fail!("bread of block 55"),
        }
    }
    assert_test!(bcache_audit_rings(), "rings consistent after cycling");
    pass!()
}

/// Churning through more distinct blocks than the pool holds forces
/// evictions and inter-bucket steals; every block still reads back its own
/// bytes.
pub fn test_bcache_eviction_churn() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    for blockno in 64..104u32 {
        MEM_DISK.fill_block(blockno, blockno as u8);
    }
    for blockno in 64..104u32 {
        let buf = match bread(1, blockno) {
            Ok(buf) => buf,
            Err(_) => return fail!("bread of block {}", blockno),
        };
        assert_eq_test!(buf.data()[0], blockno as u8, "block content after churn");
        buf.release();
    }
    assert_test!(bcache_audit_rings(), "rings consistent after churn");
    pass!()
}

/// A pinned slot survives full-pool eviction pressure without being
/// recycled; after unpin the cache stays coherent.
pub fn test_bcache_pin_keeps_resident() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    let mut buf = match bread(1, 5) {
        Ok(buf) => buf,
        Err(_) => return fail!("bread of block 5"),
    };
    buf.data_mut()[0] = 0x77;
    if buf.write().is_err() {
        return fail!("write of block 5");
    }
    let pin = buf.pin();
    buf.release();

    assert_test!(churn_blocks(), "churn while pinned");

    let reads_before = MEM_DISK.read_count();
    let again = match bread(1, 5) {
        Ok(buf) => buf,
        Err(_) => return fail!("re-read of pinned block"),
    };
    assert_eq_test!(
        MEM_DISK.read_count(),
        reads_before,
        "pinned slot stayed cached through eviction pressure"
    );
    assert_eq_test!(again.data()[0], 0x77, "pinned contents intact");
    again.release();

    pin.unpin();
    assert_test!(churn_blocks(), "churn after unpin");

    let back = match bread(1, 5) {
        Ok(buf) => buf,
        Err(_) => return fail!("re-read after unpin"),
    };
    assert_eq_test!(back.data()[0], 0x77, "contents stable after unpin churn");
    back.release();

    assert_test!(bcache_audit_rings(), "rings consistent after pin cycle");
    pass!()
}

/// Device errors are handed to the caller and the claimed slot is released,
/// so erroring reads cannot drain the pool.
pub fn test_bcache_error_propagation() -> TestResult {
    if !ensure_bcache() {
        return TestResult::Skipped;
    }

    for _ in 0..40 {
        match bread(1, 9999) {
            Err(BlockDeviceError::OutOfRange) => {}
            Err(_) => return fail!("unexpected error kind"),
            Ok(_) => return fail!("out-of-range read succeeded"),
        }
    }

    match bread(1, 57) {
        Ok(buf) => buf.release(),
        Err(_) => return fail!("valid read after errors"),
    }
    assert_test!(bcache_audit_rings(), "rings consistent after error storm");
    pass!()
}

define_test_suite!(
    bcache,
    [
        test_bcache_hit_no_reread,
        test_bcache_write_once,
        test_bcache_release_cycle,
        test_bcache_eviction_churn,
        test_bcache_pin_keeps_resident,
        test_bcache_error_propagation,
    ]
);
