//! UI utilities for mnu CLI.

use std::time::Duration;

use mnu_core::vault::VaultItem;

/// Format a clear-after duration the way it is configured, e.g. `15s` or `2m`.
pub fn format_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Print items as tab-separated `id name username` lines, ready for a menu.
pub fn print_items(items: &[VaultItem]) {
    for item in items {
        println!(
            "{}\t{}\t{}",
            item.id,
            item.name,
            item.username().unwrap_or("")
        );
    }
}
