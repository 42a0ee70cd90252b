use std::io::{self, Write};

use nibble_core::host::{Haptics, ImpactStyle, NotificationKind};

/// Haptics for a terminal: errors ring the bell, everything else is silent.
pub struct TerminalHaptics {
    bell: bool,
}

impl TerminalHaptics {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl Haptics for TerminalHaptics {
    fn impact(&self, style: ImpactStyle) {
        tracing::trace!(?style, "impact");
    }

    fn notify(&self, kind: NotificationKind) {
        tracing::trace!(?kind, "notify");
        if self.bell && kind == NotificationKind::Error {
            let mut stderr = io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }
}
