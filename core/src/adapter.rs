//! The narrow contract every source must implement.
//!
//! Adapters wrap a source SDK (mail API, board API, scrape client) and
//! expose exactly four things: enumeration, hydration, action execution,
//! and a declared capability set. They never touch the state store or the
//! output directory; the orchestrator owns both sides of that boundary.

use gleaner_types::{Action, ActionKind, HydratedItem, ItemRef, Result, Rule};

pub trait SourceAdapter {
    /// Stable tag naming the source (`mail`, `board`, ...). Used as the
    /// `source` frontmatter field and the state store's source type.
    fn source_tag(&self) -> &str;

    /// Action kinds this adapter can execute, declared once at
    /// registration. `Save` is universal and handled by the orchestrator;
    /// adapters list only their source-side capabilities. Configured rules
    /// naming anything outside this set are rejected at construction.
    fn capabilities(&self) -> &[ActionKind];

    /// Enumerate item references for a rule's query, honoring
    /// `rule.max_items`. Adapters document their yield order; time-ordered
    /// sources yield newest first.
    fn enumerate(&mut self, rule: &Rule) -> impl Future<Output = Result<Vec<ItemRef>>> + Send;

    /// Fetch the full content for one reference. A `content` error here
    /// skips the item without stopping the rule.
    fn hydrate(&mut self, reference: &ItemRef)
    -> impl Future<Output = Result<HydratedItem>> + Send;

    /// Execute one non-`save` action against the source.
    fn execute(
        &mut self,
        action: &Action,
        item: &HydratedItem,
    ) -> impl Future<Output = Result<()>> + Send;
}
