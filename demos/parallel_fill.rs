//! Fill a shared array of f64 from several worker threads, each owning a
//! disjoint slice, then verify it through an independent read-only handle.

use std::{mem::size_of, thread, time::Instant};

use shm_region::{Access, RegionConfig, Result, SharedRegion};

const NAME: &str = "/shm_region_parallel";
const ELEMENTS: usize = 4 * 1024 * 1024;
const WORKERS: usize = 4;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let size = ELEMENTS * size_of::<f64>();
    let mut region = SharedRegion::new(RegionConfig::new(NAME, size).with_unlink_on_drop(true))?;
    let mut view = region.map(Access::ReadWrite)?;

    let start = Instant::now();
    let chunks = view.split_mut(WORKERS, size_of::<f64>())?;
    thread::scope(|s| {
        let mut next = 0usize;
        for chunk in chunks {
            let base = next;
            next += chunk.len() / size_of::<f64>();
            s.spawn(move || {
                for (i, slot) in chunk.chunks_exact_mut(size_of::<f64>()).enumerate() {
                    let x = (base + i) as f64;
                    let value = x.sin().powi(2) + x.cos().powi(2);
                    slot.copy_from_slice(&value.to_ne_bytes());
                }
            });
        }
    });
    println!("{} workers filled {} elements in {:?}", WORKERS, ELEMENTS, start.elapsed());

    let mut reader = SharedRegion::open_existing(NAME, Access::ReadOnly)?;
    let check = reader.map(Access::ReadOnly)?;
    let sum: f64 = check
        .chunks_exact(size_of::<f64>())
        .map(|b| f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .sum();
    println!("Sum seen by reader: {:.3} (expected ~{})", sum, ELEMENTS);

    reader.unmap(check)?;
    region.unmap(view)?;
    Ok(())
}
