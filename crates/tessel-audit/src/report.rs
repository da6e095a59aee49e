use std::fmt::Write;

use crate::IntegrityReport;

impl IntegrityReport {
    /// Plain-text rendering for logs and the command line.
    pub fn render(&self) -> String {
        let mut s = String::new();
        let c = &self.counts;
        let _ = writeln!(s, "== tile integrity ==");
        let _ = writeln!(
            s,
            "tiles: saved {} | lookup {} | visible {} | tracked {}{}",
            c.saved,
            c.lookup,
            c.visible,
            c.tracked,
            if c.agree() { "  [ok]" } else { "  [MISMATCH]" }
        );
        if c.pending > 0 {
            let _ = writeln!(s, "pending operation: {} tiles touched", c.pending);
        }
        if !c.agree() {
            let d = |a: usize, b: usize| a as isize - b as isize;
            let _ = writeln!(
                s,
                "  delta vs saved: lookup {:+} visible {:+} tracked {:+}",
                d(c.lookup, c.saved),
                d(c.visible, c.saved),
                d(c.tracked, c.saved)
            );
        }

        let _ = writeln!(s, "-- mesh modes --");
        for g in &self.geometries {
            let modes: Vec<String> = g
                .saved_by_mode
                .iter()
                .zip(&g.chunked_by_mode)
                .map(|((m, saved), (_, chunked))| {
                    if saved == chunked {
                        format!("{} {}", m.name(), saved)
                    } else {
                        format!("{} {}/{}", m.name(), saved, chunked)
                    }
                })
                .collect();
            let _ = writeln!(
                s,
                "{:<8} {:>6} [{}]{}",
                g.geometry.name(),
                g.saved_total(),
                modes.join(", "),
                if g.consistent() { "" } else { "  [MISMATCH]" }
            );
        }

        let _ = writeln!(s, "-- chunks --");
        for t in &self.registries {
            if t.live == 0 && t.consistent() {
                continue;
            }
            let _ = writeln!(
                s,
                "{:<8} {} chunks in {} regions{}",
                t.geometry.name(),
                t.listed,
                t.regions,
                if t.consistent() { "" } else { "  [MISMATCH]" }
            );
        }
        for r in &self.regions {
            let _ = writeln!(
                s,
                "  {:<8} region {}: {} chunks, {} tiles, avg {:.1}% peak {:.1}%{}",
                r.geometry.name(),
                r.region,
                r.chunks,
                r.tiles,
                r.average_pct,
                r.peak_pct,
                if r.nearly_full { "  [nearly full]" } else { "" }
            );
        }
        let nearly_full = self.nearly_full_regions().count();
        if nearly_full > 0 {
            let _ = writeln!(
                s,
                "{} regions have a chunk at or above {:.0}% capacity",
                nearly_full,
                self.nearly_full_threshold * 100.0
            );
        }

        let st = &self.storage;
        let _ = writeln!(s, "-- storage --");
        let _ = writeln!(
            s,
            "{} bytes for {} tiles ({} transforms): {:.1} bytes/tile",
            st.total_bytes, st.tiles, st.transforms, st.bytes_per_tile
        );

        if !self.notes.is_empty() {
            let _ = writeln!(s, "-- notes --");
            for n in &self.notes {
                let _ = writeln!(s, "{}", n);
            }
        }

        let _ = writeln!(s, "-- issues --");
        if self.issues.is_empty() {
            let _ = writeln!(s, "none");
        }
        for issue in &self.issues {
            let _ = writeln!(s, "- {}", issue);
        }
        s
    }
}
