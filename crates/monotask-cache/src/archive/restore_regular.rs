use std::io::Read;

use crate::CacheError;

/// Writes one regular-file tar entry to `dest`, setting executable bits
/// from the tar header's mode. Grounded on
/// `turborepo-cache/src/cache_archive/restore_regular.rs`.
pub fn restore_regular<R: Read>(
    mut entry: tar::Entry<'_, R>,
    dest: &std::path::Path,
) -> Result<(), CacheError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mode = entry.header().mode().unwrap_or(0o644);
    let mut file = std::fs::File::create(dest)?;
    std::io::copy(&mut entry, &mut file)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(mode);
        std::fs::set_permissions(dest, perms)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
