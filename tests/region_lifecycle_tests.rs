//! Integration tests for the region lifecycle state machine

use std::sync::atomic::{AtomicUsize, Ordering};

use shm_region::{unlink, Access, RegionError, RegionState, SharedRegion};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    format!(
        "/shm_region_lc_{}_{}_{}",
        std::process::id(),
        tag,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle_leaves_no_trace() {
        let name = unique_name("full");

        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
        assert!(region.is_created());
        assert_eq!(region.state(), RegionState::Sized);
        assert_eq!(region.size(), 4096);
        assert!(SharedRegion::exists(&name).unwrap());

        let view = region.map(Access::ReadWrite).unwrap();
        assert_eq!(view.len(), 4096);
        assert_eq!(region.state(), RegionState::Mapped);

        region.unmap(view).unwrap();
        assert_eq!(region.state(), RegionState::Unmapped);

        region.close().unwrap();
        assert_eq!(region.state(), RegionState::Closed);

        region.unlink().unwrap();
        assert!(region.is_unlinked());
        assert!(!SharedRegion::exists(&name).unwrap());

        #[cfg(target_os = "linux")]
        assert!(!std::path::Path::new(&format!("/dev/shm{}", name)).exists());
    }

    #[test]
    fn test_open_without_size_stays_open() {
        let name = unique_name("open");

        let mut region = SharedRegion::open_or_create(&name, 0, 0o600).unwrap();
        assert_eq!(region.state(), RegionState::Open);
        assert_eq!(region.size(), 0);

        region.resize(8192).unwrap();
        assert_eq!(region.state(), RegionState::Sized);

        let view = region.map(Access::ReadOnly).unwrap();
        assert_eq!(view.len(), 8192);
        assert!(view.iter().all(|&b| b == 0));

        region.unmap(view).unwrap();
        region.close().unwrap();
        region.unlink().unwrap();
    }

    #[test]
    fn test_resize_while_mapped_is_rejected() {
        let name = unique_name("resize_mapped");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
        let view = region.map(Access::ReadWrite).unwrap();

        let err = region.resize(8192).unwrap_err();
        assert!(matches!(
            err,
            RegionError::InvalidState {
                operation: "resize",
                state: RegionState::Mapped,
                ..
            }
        ));

        // The failed resize changed nothing
        assert_eq!(region.state(), RegionState::Mapped);
        assert_eq!(region.size(), 4096);
        assert_eq!(view.len(), 4096);

        region.unmap(view).unwrap();
        region.unlink().unwrap();
    }

    #[test]
    fn test_resize_after_unmap_is_reflected_by_next_map() {
        let name = unique_name("resize_unmapped");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();

        let view = region.map(Access::ReadWrite).unwrap();
        region.unmap(view).unwrap();

        region.resize(3 * 4096).unwrap();
        assert_eq!(region.state(), RegionState::Sized);

        let view = region.map(Access::ReadWrite).unwrap();
        assert_eq!(view.len(), 3 * 4096);
        assert_eq!(region.size(), 3 * 4096);

        region.unmap(view).unwrap();
        region.resize(100).unwrap();
        let view = region.map(Access::ReadOnly).unwrap();
        assert_eq!(view.len(), 100);

        region.unmap(view).unwrap();
        region.close().unwrap();
        region.unlink().unwrap();
    }

    #[test]
    fn test_resize_unchanged_is_idempotent() {
        let name = unique_name("idempotent");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();

        region.resize(4096).unwrap();
        region.resize(4096).unwrap();
        assert_eq!(region.state(), RegionState::Sized);
        assert_eq!(region.stats().os_size, Some(4096));

        region.unlink().unwrap();
    }

    #[test]
    fn test_double_close_is_rejected() {
        let name = unique_name("double_close");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();

        region.close().unwrap();
        let err = region.close().unwrap_err();
        assert!(matches!(
            err,
            RegionError::InvalidState {
                operation: "close",
                state: RegionState::Closed,
                ..
            }
        ));

        region.unlink().unwrap();
    }

    #[test]
    fn test_close_while_mapped_is_rejected() {
        let name = unique_name("close_mapped");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
        let view = region.map(Access::ReadWrite).unwrap();

        assert!(region.close().unwrap_err().is_invalid_state());
        assert_eq!(region.state(), RegionState::Mapped);

        region.unmap(view).unwrap();
        region.close().unwrap();
        region.unlink().unwrap();
    }

    #[test]
    fn test_operations_after_close_are_rejected() {
        let name = unique_name("after_close");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
        region.close().unwrap();

        assert!(region.resize(8192).unwrap_err().is_invalid_state());
        assert!(region.map(Access::ReadOnly).unwrap_err().is_invalid_state());
        assert_eq!(region.stats().os_size, None);

        // Unlink is independent of the descriptor
        region.unlink().unwrap();
    }

    #[test]
    fn test_second_map_is_rejected() {
        let name = unique_name("second_map");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
        let view = region.map(Access::ReadWrite).unwrap();

        assert!(region.map(Access::ReadOnly).unwrap_err().is_invalid_state());

        region.unmap(view).unwrap();
        assert_eq!(region.state(), RegionState::Unmapped);
        region.unlink().unwrap();
    }

    #[test]
    fn test_pattern_survives_remap() {
        let name = unique_name("remap");
        let size = 4096;
        let mut region = SharedRegion::open_or_create(&name, size, 0o600).unwrap();

        let pattern: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();

        let mut view = region.map(Access::ReadWrite).unwrap();
        view.write_at(0, &pattern).unwrap();
        region.unmap(view).unwrap();

        let view = region.map(Access::ReadOnly).unwrap();
        assert_eq!(view.as_slice(), pattern.as_slice());

        region.unmap(view).unwrap();
        region.close().unwrap();
        region.unlink().unwrap();
    }

    #[test]
    fn test_dropped_view_counts_as_unmapped() {
        let name = unique_name("dropped_view");
        let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();

        {
            let mut view = region.map(Access::ReadWrite).unwrap();
            view.fill(0x5A).unwrap();
            assert!(region.is_mapped());
        }

        assert_eq!(region.state(), RegionState::Unmapped);
        region.resize(8192).unwrap();

        let view = region.map(Access::ReadOnly).unwrap();
        assert!(view[..4096].iter().all(|&b| b == 0x5A));
        assert!(view[4096..].iter().all(|&b| b == 0));

        region.unmap(view).unwrap();
        region.close().unwrap();
        unlink(&name).unwrap();
    }

    #[test]
    fn test_view_outlives_closed_handle() {
        let name = unique_name("outlives");
        let mut view = {
            let mut region = SharedRegion::open_or_create(&name, 4096, 0o600).unwrap();
            let view = region.map(Access::ReadWrite).unwrap();
            region.unlink().unwrap();
            view
        };

        view.write_at(100, b"still here").unwrap();
        let mut buf = [0u8; 10];
        view.read_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"still here");
    }
}
