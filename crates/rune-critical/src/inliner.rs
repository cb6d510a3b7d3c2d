//! Document assembly: loads stylesheets into the document, reduces every
//! `<style>` to its critical rules, defers the full sheets and merges the
//! result.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ego_tree::NodeId;
use futures::future::{BoxFuture, join_all};
use rune_io::AssetStore;
use tracing::{error, info, warn};

use crate::css::SelectorCache;
use crate::dom::{Document, SelectorOracle};
use crate::engine::CriticalEngine;
use crate::error::{CriticalError, Result};
use crate::hooks::{DefaultHooks, StyleHooks, StyleSource, StyleUnit};
use crate::options::CriticalOptions;
use crate::paths::{base_dir, ensure_within, has_glob_meta, normalize_lexically};
use crate::preload::rewrite_link;

/// A pruned stylesheet write that may still be in flight.
enum PendingWrite {
    Spawned(tokio::task::JoinHandle<()>),
    Deferred(BoxFuture<'static, ()>),
}

/// Inlines critical CSS into HTML documents.
///
/// One instance can process many documents; the selector cache and the
/// queue of pending write-backs are shared between them.
pub struct Inliner<S: AssetStore> {
    options: CriticalOptions,
    store: Arc<S>,
    hooks: Box<dyn StyleHooks>,
    selectors: SelectorCache,
    pending: Mutex<Vec<PendingWrite>>,
}

/// Style units of one document, keyed by their `<style>` element.
type Units = HashMap<NodeId, StyleUnit>;

impl<S: AssetStore> Inliner<S> {
    pub fn new(options: CriticalOptions, store: Arc<S>) -> Self {
        Self::with_hooks(options, store, DefaultHooks)
    }

    pub fn with_hooks(options: CriticalOptions, store: Arc<S>, hooks: impl StyleHooks + 'static) -> Self {
        Self {
            options,
            store,
            hooks: Box::new(hooks),
            selectors: SelectorCache::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &CriticalOptions {
        &self.options
    }

    /// Inline the critical CSS of `html` and return the rewritten document.
    ///
    /// Pruned stylesheets are written in the background; call
    /// [`Inliner::flush`] to wait for them.
    pub async fn process(&self, html: &str) -> Result<String> {
        let start = Instant::now();
        let mut doc = Document::parse(html);
        let mut units = Units::new();

        if !self.options.additional_stylesheets.is_empty() {
            self.embed_additional(&mut doc, &mut units).await;
        }
        if self.options.external {
            self.embed_linked(&mut doc, &mut units).await;
        }

        let styles = self.affected_styles(&doc, &units)?;
        let mut preloaded_fonts = HashSet::new();
        for style in &styles {
            let unit = units
                .remove(style)
                .unwrap_or_else(|| StyleUnit::inline(*style));
            self.process_style(&mut doc, &unit, &mut preloaded_fonts);
            units.insert(*style, unit);
        }

        if self.options.merge_stylesheets && !styles.is_empty() {
            self.merge(&mut doc, &units)?;
        }

        let output = doc.serialize()?;
        info!("Time {}ms", start.elapsed().as_millis());
        Ok(output)
    }

    /// Wait for every scheduled stylesheet write to finish.
    pub async fn flush(&self) {
        let pending = self
            .pending
            .lock()
            .map(|mut pending| mem::take(&mut *pending))
            .unwrap_or_default();
        for write in pending {
            match write {
                PendingWrite::Spawned(handle) => {
                    if let Err(error) = handle.await {
                        error!(%error, "stylesheet write task failed");
                    }
                }
                PendingWrite::Deferred(task) => task.await,
            }
        }
    }

    /// The `<style>` elements to reduce, in document order.
    fn affected_styles(&self, doc: &Document, units: &Units) -> Result<Vec<NodeId>> {
        let styles = doc.select("style")?;
        if self.options.reduce_inline_styles {
            return Ok(styles);
        }
        Ok(styles
            .into_iter()
            .filter(|style| units.get(style).is_some_and(StyleUnit::is_external))
            .collect())
    }

    fn log_resolve_error(&self, href: &str, error: &CriticalError) {
        if !error.is_silent() {
            warn!(href, %error, "skipping stylesheet");
        }
    }

    /// Paths an `additional_stylesheets` entry stands for.
    fn expand_additional(&self, entry: &str) -> Vec<PathBuf> {
        if !has_glob_meta(entry) {
            return match self.hooks.resolve_path(entry, &self.options) {
                Ok(path) => vec![path],
                Err(error) => {
                    self.log_resolve_error(entry, &error);
                    Vec::new()
                }
            };
        }
        let base = match base_dir(&self.options) {
            Ok(base) => base,
            Err(error) => {
                warn!(%error, "unable to resolve stylesheet base directory");
                return Vec::new();
            }
        };
        let pattern = base.join(entry.trim_start_matches('/'));
        match self.store.glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths
                .into_iter()
                .filter_map(|path| ensure_within(&base, normalize_lexically(&path)).ok())
                .collect(),
            Err(error) => {
                warn!(pattern = %pattern.display(), %error, "invalid stylesheet pattern");
                Vec::new()
            }
        }
    }

    /// Append each additional stylesheet to `<head>` as an external style.
    async fn embed_additional(&self, doc: &mut Document, units: &mut Units) {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for entry in &self.options.additional_stylesheets {
            if !seen.insert(entry.as_str()) {
                continue;
            }
            for path in self.expand_additional(entry) {
                let name = if has_glob_meta(entry) {
                    path.display().to_string()
                } else {
                    entry.clone()
                };
                targets.push((name, path));
            }
        }

        let sheets = join_all(targets.iter().map(|(_, path)| self.read_sheet(path))).await;
        let Some(head) = doc.head() else {
            return;
        };
        for ((name, path), sheet) in targets.into_iter().zip(sheets) {
            let Some(sheet) = sheet else {
                continue;
            };
            let style = doc.create_element("style");
            doc.set_text(style, &sheet);
            doc.append(head, style);
            units.insert(style, StyleUnit::external(style, name, StyleSource::Additional, path));
        }
    }

    /// Put the text of every local `<link rel="stylesheet">` into a `<style>`
    /// before it and defer the link itself. Reads are issued together.
    async fn embed_linked(&self, doc: &mut Document, units: &mut Units) {
        let links = match doc.select("link[rel=\"stylesheet\"]") {
            Ok(links) => links,
            Err(error) => {
                warn!(%error, "unable to query stylesheet links");
                return;
            }
        };
        let mut targets = Vec::new();
        for link in links {
            let Some(href) = doc.attr(link, "href").map(str::to_string) else {
                continue;
            };
            if !href.ends_with(".css") {
                continue;
            }
            match self.hooks.resolve_path(&href, &self.options) {
                Ok(path) => targets.push((link, href, path)),
                Err(error) => self.log_resolve_error(&href, &error),
            }
        }

        let sheets = join_all(targets.iter().map(|(_, _, path)| self.read_sheet(path))).await;
        for ((link, href, path), sheet) in targets.into_iter().zip(sheets) {
            if let Some(sheet) = sheet {
                let unit = self.embed_link(doc, link, href, path, &sheet);
                units.insert(unit.element, unit);
            }
        }
    }

    fn embed_link(&self, doc: &mut Document, link: NodeId, href: String, path: PathBuf, sheet: &str) -> StyleUnit {
        let style = doc.create_element("style");
        doc.set_text(style, sheet);
        doc.insert_before(link, style);
        let mut unit = StyleUnit::external(style, href, StyleSource::Linked, path);
        unit.companions.push(link);

        let threshold = self.options.inline_threshold;
        if self.hooks.on_inline_threshold(&unit, sheet, threshold) {
            info!(
                "Inlined all of {} ({} was below the threshold of {})",
                unit.name,
                sheet.len(),
                threshold
            );
            unit.reduce = false;
            doc.detach(link);
            return unit;
        }

        let created = rewrite_link(
            doc,
            link,
            &unit.name,
            self.options.preload,
            self.options.noscript_fallback,
        );
        unit.companions.extend(created);
        unit
    }

    /// Read a stylesheet, treating a missing or empty file as absent.
    async fn read_sheet(&self, path: &Path) -> Option<String> {
        match self.store.read(path).await {
            Ok(sheet) if sheet.is_empty() => None,
            Ok(sheet) => Some(sheet),
            Err(source) => {
                let error = CriticalError::NotFound {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("Unable to locate stylesheet: {}", path.display());
                tracing::debug!(%error);
                None
            }
        }
    }

    /// Reduce one `<style>` element in place.
    fn process_style(&self, doc: &mut Document, unit: &StyleUnit, preloaded_fonts: &mut HashSet<String>) {
        if !unit.reduce {
            return;
        }
        let style = unit.element;
        let before = doc.text(style);
        if before.is_empty() {
            return;
        }
        let name = unit.display_name().to_string();
        let prune = self.options.prune_source && unit.source == StyleSource::Linked;

        let engine = CriticalEngine::new(&self.options, &self.selectors);
        let reduction = {
            let oracle = SelectorOracle::for_document(doc, self.options.container.as_deref());
            match engine.reduce(&before, &oracle, prune) {
                Ok(reduction) => reduction,
                Err(error) => {
                    warn!(name = %name, %error, "failed to parse stylesheet");
                    return;
                }
            }
        };

        if let Some(head) = doc.head() {
            for url in &reduction.font_preloads {
                if !preloaded_fonts.insert(url.clone()) {
                    continue;
                }
                let link = doc.create_element("link");
                doc.set_attr(link, "rel", "preload");
                doc.set_attr(link, "as", "font");
                doc.set_attr(link, "crossorigin", "anonymous");
                doc.set_attr(link, "href", url);
                doc.append(head, link);
            }
        }

        let sheet = reduction.critical;
        if sheet.trim().is_empty() {
            doc.detach(style);
            return;
        }

        let mut after_text = String::new();
        let mut inlined_all = false;
        if let Some(inverse) = reduction.inverse {
            inlined_all = self.prune_source(doc, unit, &before, &inverse);
            if !inlined_all {
                if let Some(path) = unit.path.clone() {
                    after_text = format!(
                        ", reducing non-inlined size {}% to {}",
                        percent(inverse.len(), before.len()),
                        format_size(inverse.len())
                    );
                    self.schedule_write(path, name.clone(), inverse);
                }
            }
        }

        if !inlined_all {
            doc.set_text(style, &sheet);
        }

        info!(
            "Inlined {} ({}% of original {}) of {}{}.",
            format_size(sheet.len()),
            percent(sheet.len(), before.len()),
            format_size(before.len()),
            name,
            after_text
        );
    }

    /// Decide between writing `inverse` back and inlining the whole sheet.
    /// Returns true when the sheet was inlined whole.
    fn prune_source(&self, doc: &mut Document, unit: &StyleUnit, before: &str, inverse: &str) -> bool {
        let minimum = self.options.minimum_external_size;
        let below_minimum = minimum > 0 && inverse.len() < minimum;
        if below_minimum {
            info!(
                "Inlined all of {} (non-critical external stylesheet would have been {}b, which was below the threshold of {})",
                unit.display_name(),
                inverse.len(),
                minimum
            );
        }
        let inline_all = self
            .hooks
            .on_prune(unit, before, inverse, below_minimum || inverse.is_empty());
        if inline_all {
            doc.set_text(unit.element, before);
            for companion in &unit.companions {
                doc.detach(*companion);
            }
        }
        inline_all
    }

    /// Write `contents` to `path` without blocking document processing.
    fn schedule_write(&self, path: PathBuf, name: String, contents: String) {
        let store = Arc::clone(&self.store);
        let task = async move {
            match store.write(&path, contents).await {
                Ok(()) => info!("{name} was successfully updated"),
                Err(error) => error!(path = %path.display(), %error, "failed to write pruned stylesheet"),
            }
        };
        let write = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => PendingWrite::Spawned(runtime.spawn(task)),
            Err(_) => PendingWrite::Deferred(Box::pin(task)),
        };
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(write);
        }
    }

    /// Concatenate the remaining affected styles into the first one.
    fn merge(&self, doc: &mut Document, units: &Units) -> Result<()> {
        let styles = self.affected_styles(doc, units)?;
        let Some((&first, rest)) = styles.split_first() else {
            warn!("Merging inline stylesheets into a single <style> tag skipped, no inline stylesheets to merge");
            return Ok(());
        };
        let mut sheet = doc.text(first);
        for &style in rest {
            sheet.push_str(&doc.text(style));
            doc.detach(style);
        }
        doc.set_text(first, &sheet);
        Ok(())
    }
}

fn percent(part: usize, whole: usize) -> usize {
    if whole == 0 { 0 } else { part * 100 / whole }
}

/// Human-readable byte count: `bytes` without a fraction, then `kB`, `MB`
/// and `GB` with two digits.
pub fn format_size(size: usize) -> String {
    const UNITS: [&str; 4] = ["bytes", "kB", "MB", "GB"];
    if size == 0 {
        return "0 bytes".to_string();
    }
    let mut index = 0;
    let mut scale = 1u64;
    while index + 1 < UNITS.len() && size as u64 >= scale * 1024 {
        scale *= 1024;
        index += 1;
    }
    let value = size as f64 / scale as f64;
    if index == 0 {
        format!("{size} {}", UNITS[0])
    } else {
        format!("{value:.2} {}", UNITS[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_formatted_like_the_stats_line_expects() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 kB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn percent_truncates() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 0), 0);
    }
}
