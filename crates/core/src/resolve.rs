//! Turning a free-text reply into a transfer target.
//!
//! Each [`Strategy`] is tried in [`STRATEGIES`] order; the first one that
//! produces a target wins.

use crate::error::ResolveError;
use crate::model::{PageRef, TransferTarget};

/// Independent ways of reading a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The reply is a page address.
    LiteralAddress,
    /// The reply is a 1-based position in the configured target list.
    ListIndex,
    /// The reply and a target name contain one another, ignoring case.
    NameSubstring,
}

/// Fixed priority order.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy::LiteralAddress,
    Strategy::ListIndex,
    Strategy::NameSubstring,
];

/// What a reply is resolved against.
#[derive(Clone, Copy, Debug)]
pub struct ResolveContext<'a> {
    pub targets: &'a [TransferTarget],
    /// Section used for an address that is not a configured target.
    pub default_section: Option<&'a str>,
}

/// A successful resolution and the strategy that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub target: TransferTarget,
    pub via: Strategy,
}

impl Strategy {
    pub fn apply(&self, reply: &str, ctx: &ResolveContext<'_>) -> Option<TransferTarget> {
        match self {
            Strategy::LiteralAddress => {
                if !looks_like_address(reply) {
                    return None;
                }
                if let Some(t) = ctx.targets.iter().find(|t| same_address(t.page.as_str(), reply)) {
                    return Some(t.clone());
                }
                ctx.default_section.map(|section| TransferTarget {
                    name: reply.to_string(),
                    page: PageRef::new(reply),
                    section: section.to_string(),
                })
            }
            Strategy::ListIndex => {
                let n: usize = reply.parse().ok()?;
                n.checked_sub(1).and_then(|i| ctx.targets.get(i)).cloned()
            }
            Strategy::NameSubstring => {
                let reply = reply.to_lowercase();
                ctx.targets
                    .iter()
                    .find(|t| {
                        let name = t.name.to_lowercase();
                        !name.is_empty() && (reply.contains(&name) || name.contains(&reply))
                    })
                    .cloned()
            }
        }
    }
}

/// Resolves `reply` using [`STRATEGIES`] in order.
pub fn resolve_target(reply: &str, ctx: &ResolveContext<'_>) -> Result<Resolved, ResolveError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ResolveError::Empty);
    }
    for via in STRATEGIES {
        if let Some(target) = via.apply(reply, ctx) {
            return Ok(Resolved { target, via });
        }
    }
    if looks_like_address(reply) {
        Err(ResolveError::UnknownAddress(reply.to_string()))
    } else {
        Err(ResolveError::NoMatch(reply.to_string()))
    }
}

fn looks_like_address(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn same_address(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().trim_end_matches('/').to_string();
    norm(a) == norm(b)
}
