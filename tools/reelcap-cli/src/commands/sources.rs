//! List capturable sources.

use reelcap_platform::{ExclusionList, SourceEnumerator};

pub fn run(exclude_self: bool) -> anyhow::Result<()> {
    let enumerator = SourceEnumerator::new(ExclusionList::with_defaults(), exclude_self);
    let catalog = enumerator.refresh()?;

    println!("Displays:");
    for display in &catalog.displays {
        let primary = if display.primary { " (primary)" } else { "" };
        println!(
            "  {}: {} {}x{} at ({},{}){}",
            display.id, display.name, display.width, display.height, display.x, display.y, primary
        );
    }

    println!();
    println!("Windows:");
    if catalog.windows.is_empty() {
        println!("  (none listed)");
    }
    for window in &catalog.windows {
        println!("  {:#x}: [{}] {}", window.id, window.app_id, window.title);
    }

    Ok(())
}
