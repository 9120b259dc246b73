//! Process-wide record of the scratch directory of an in-progress index
//! build, so an interrupt can remove it before the process exits

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once};

static SCRATCH: Mutex<Option<PathBuf>> = Mutex::new(None);
static HANDLER: Once = Once::new();

/// Serializes tests that touch the process-wide registration
#[cfg(test)]
pub(crate) static SERIAL: Mutex<()> = Mutex::new(());

fn scratch() -> MutexGuard<'static, Option<PathBuf>> {
    SCRATCH.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the interrupt handler. Only the first call has any effect
pub fn install_handler() {
    HANDLER.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if let Some(path) = remove_registered() {
                eprintln!("interrupted: removed `{}`", path.display());
            }
            std::process::exit(130);
        });
        if let Err(e) = result {
            log::warn!("failed to install interrupt handler: {}", e);
        }
    });
}

pub fn register(path: &Path) {
    log::trace!("registering scratch directory `{}`", path.display());
    *scratch() = Some(path.to_path_buf());
}

/// Forget the registered directory without touching it
pub fn clear() {
    scratch().take();
}

pub fn registered() -> Option<PathBuf> {
    scratch().clone()
}

/// Remove the registered directory, if any, returning its path
pub fn remove_registered() -> Option<PathBuf> {
    let path = scratch().take()?;
    if let Err(e) = std::fs::remove_dir_all(&path) {
        log::error!("failed to remove `{}`: {}", path.display(), e);
    }
    Some(path)
}
