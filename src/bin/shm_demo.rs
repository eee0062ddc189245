//! Walks one shared memory object through its whole lifecycle: create, size,
//! map, fill with `f64` values, unmap, close, unlink. Exits non-zero on the
//! first failure.

use log::info;
use shm_region::{Access, Result, SharedRegion};

const NAME: &str = "/shm_region_demo";
const ELEMENTS: usize = 1000 * 1000;
const SIZE: usize = ELEMENTS * std::mem::size_of::<f64>();

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut region = SharedRegion::open_or_create(NAME, SIZE, 0o666)?;
    info!("{} is {} ({} bytes)", region.name(), region.state(), region.size());

    let mut view = region.map(Access::ReadWrite)?;
    for (i, slot) in view.as_mut_slice()?.chunks_exact_mut(8).enumerate() {
        slot.copy_from_slice(&(i as f64).to_ne_bytes());
    }

    let mut last = [0u8; 8];
    view.read_at(SIZE - 8, &mut last)?;
    info!("Last element: {}", f64::from_ne_bytes(last));

    region.unmap(view)?;
    region.close()?;
    region.unlink()?;

    info!("{} exists after unlink: {}", NAME, SharedRegion::exists(NAME)?);
    Ok(())
}
