//! Basic usage of a named shared memory region

use shm_region::{Access, RegionConfig, Result, SharedRegion};

const NAME: &str = "/shm_region_example";

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("shm-region Example");
    println!("==================");

    let config = RegionConfig::new(NAME, 64 * 1024).with_permissions(0o600);
    println!("Opening region: {}", config.name);
    let mut writer = SharedRegion::new(config)?;
    println!("  Created: {}", writer.is_created());
    println!("  Size: {} bytes", writer.size());
    println!("  State: {}", writer.state());

    let mut view = writer.map(Access::ReadWrite)?;
    view.write_at(0, b"hello from the writer")?;

    // A second handle on the same name sees the same bytes
    let mut reader = SharedRegion::open_existing(NAME, Access::ReadOnly)?;
    let reader_view = reader.map(Access::ReadOnly)?;
    println!(
        "\nReader sees: {:?}",
        String::from_utf8_lossy(&reader_view[..21])
    );

    reader.unmap(reader_view)?;
    reader.close()?;

    // Unlinking removes the name, the writer's view keeps working
    writer.unlink()?;
    view.write_at(0, b"still mapped")?;
    println!("After unlink: {:?}", String::from_utf8_lossy(&view[..12]));

    writer.unmap(view)?;
    writer.close()?;

    let stats = writer.stats();
    println!("\nFinal state: {} (unlinked: {})", stats.state, stats.unlinked);
    Ok(())
}
