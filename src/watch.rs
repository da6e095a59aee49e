use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tessel_tiles::StoreConfig;

use crate::commands::{CmdResult, report};

/// Prints a report now and again after every change to `scene`.
pub fn watch(config: &StoreConfig, scene: &Path) -> CmdResult<()> {
    let (tx, rx) = mpsc::channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res {
            match event.kind {
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
                    let _ = tx.send(());
                }
                _ => {}
            }
        }
    })?;
    watcher.watch(scene, RecursiveMode::NonRecursive)?;
    log::info!("watching {}", scene.display());

    run_once(config, scene);
    while rx.recv().is_ok() {
        // Editors often write in several bursts; coalesce them.
        std::thread::sleep(Duration::from_millis(100));
        while rx.try_recv().is_ok() {}
        run_once(config, scene);
    }
    Ok(())
}

fn run_once(config: &StoreConfig, scene: &Path) {
    if let Err(e) = report(config, scene) {
        log::warn!("report failed for {}: {}", scene.display(), e);
    }
}
