//! Check system capabilities.

use reelcap_platform::permissions::{check_capabilities, print_capability_report};

pub fn run() -> anyhow::Result<()> {
    let capabilities = check_capabilities();
    print_capability_report(&capabilities);

    let missing_required = capabilities.iter().any(|c| c.required && !c.available);
    if missing_required {
        anyhow::bail!("Required capabilities are missing");
    }

    Ok(())
}
