//! Lookup resolution: exact match, then prefix, then nothing

use std::collections::HashSet;

use tracing::debug;

use crate::cache::{LoadedDictionary, ResourceCache};
use crate::error::{ErrorKind, Result};
use crate::index::EntryId;
use crate::types::{Hit, LookupResult, MatchKind, Payload};

/// Redirect chains longer than this stop at the last record reached
pub const MAX_REDIRECTS: usize = 5;

/// Resolves queries against dictionaries held by a [`ResourceCache`]
pub struct LookupResolver<'a> {
    cache: &'a ResourceCache,
    prefix_limit: usize,
}

impl<'a> LookupResolver<'a> {
    pub fn new(cache: &'a ResourceCache, prefix_limit: usize) -> Self {
        LookupResolver {
            cache,
            prefix_limit,
        }
    }

    /// Look `word` up in dictionary `dictid`.
    ///
    /// A word with no entry is a `MatchKind::None` result, not an error.
    pub fn resolve(&self, dictid: &str, word: &str) -> Result<LookupResult> {
        let dict = self.cache.resource_for(dictid)?;
        let result = resolve_in(&dict, word, self.prefix_limit)?;
        debug!(
            dictid,
            query = %result.query,
            match_kind = ?result.match_kind,
            hits = result.hits.len(),
            "resolved lookup"
        );
        Ok(result)
    }

    /// Up to `limit` raw headwords whose keys start with `prefix`
    pub fn complete(&self, dictid: &str, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let dict = self.cache.resource_for(dictid)?;
        let key = dict.index.normalizer().normalize(prefix);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        Ok(dict
            .index
            .prefix(&key)
            .iter()
            .filter_map(|k| k.entries.first())
            .filter_map(|id| dict.entries.get(*id))
            .map(|entry| entry.headword.clone())
            .take(limit)
            .collect())
    }
}

/// Resolve `word` against one loaded dictionary
pub fn resolve_in(dict: &LoadedDictionary, word: &str, prefix_limit: usize) -> Result<LookupResult> {
    let query = dict.index.normalizer().normalize(word);
    if query.is_empty() {
        return Ok(LookupResult::none(query));
    }

    let (match_kind, ids): (MatchKind, Vec<EntryId>) = match dict.index.exact(&query) {
        Some(ids) => (MatchKind::Exact, ids.to_vec()),
        None => {
            let ids: Vec<EntryId> = dict
                .index
                .prefix(&query)
                .iter()
                .flat_map(|k| k.entries.iter().copied())
                .take(prefix_limit)
                .collect();
            if ids.is_empty() {
                return Ok(LookupResult::none(query));
            }
            (MatchKind::Prefix, ids)
        }
    };

    let mut hits = Vec::with_capacity(ids.len());
    for id in ids {
        let hit = hit_for(dict, id)?;
        let mut chain = HashSet::from([dict.index.normalizer().normalize(&hit.headword)]);
        follow_redirects(dict, hit, 0, &mut chain, &mut hits)?;
    }
    hits.dedup();

    Ok(LookupResult {
        query,
        match_kind,
        hits,
    })
}

fn hit_for(dict: &LoadedDictionary, id: EntryId) -> Result<Hit> {
    let payload = match dict.payload(id) {
        Ok(payload) => payload,
        // A corrupt record still renders as a fallback block
        Err(e) if e.kind() == ErrorKind::FormatParse => Payload::Undecodable(e.to_string()),
        Err(e) => return Err(e),
    };
    Ok(Hit {
        headword: dict.entries[id].headword.clone(),
        payload,
    })
}

/// Replace a redirect hit by its target's entries. Cycles, dangling targets
/// and over-long chains keep the redirect record itself.
fn follow_redirects(
    dict: &LoadedDictionary,
    hit: Hit,
    depth: usize,
    chain: &mut HashSet<String>,
    out: &mut Vec<Hit>,
) -> Result<()> {
    let target = match hit.payload.redirect_target() {
        Some(target) if depth < MAX_REDIRECTS => dict.index.normalizer().normalize(target),
        _ => {
            out.push(hit);
            return Ok(());
        }
    };
    let ids = match dict.index.exact(&target) {
        Some(ids) if chain.insert(target.clone()) => ids,
        _ => {
            debug!(from = %hit.headword, to = %target, "redirect not followed");
            out.push(hit);
            return Ok(());
        }
    };
    for &id in ids {
        follow_redirects(dict, hit_for(dict, id)?, depth + 1, chain, out)?;
    }
    Ok(())
}
