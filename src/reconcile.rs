//! Cross-source deduplication: group records describing the same work and
//! fold each group into one canonical [`Paper`].

use std::collections::{HashMap, HashSet};

use crate::apis::Paper;

/// Lowercase, whitespace-collapsed title used for the title+year key.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn doi_key(doi: &str) -> String {
    let doi = doi.trim();
    let bare = ["https://doi.org/", "http://doi.org/", "doi:"]
        .iter()
        .find_map(|p| doi.strip_prefix(p))
        .unwrap_or(doi);
    format!("doi:{}", bare.to_lowercase())
}

/// arXiv feeds report versioned ids (`1706.03762v7`), other indexes the bare
/// id; link on the bare form.
fn arxiv_key(id: &str) -> String {
    let id = id.trim();
    let bare = match id.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < id.len()
                && id[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    };
    format!("arxiv:{}", bare)
}

/// Every identifier-derived key a record carries, in priority order.
fn identifier_keys(p: &Paper) -> Vec<String> {
    let ids = &p.source_ids;
    let mut keys = Vec::with_capacity(4);
    if let Some(doi) = &ids.doi {
        keys.push(doi_key(doi));
    }
    if let Some(v) = &ids.arxiv_id {
        keys.push(arxiv_key(v));
    }
    if let Some(v) = &ids.open_alex_id {
        keys.push(format!("openalex:{}", v));
    }
    if let Some(v) = &ids.semantic_scholar_id {
        keys.push(format!("semantic_scholar:{}", v));
    }
    keys
}

fn fallback_key(p: &Paper) -> String {
    match p.year {
        Some(year) if !p.title.trim().is_empty() => {
            format!("title_year:{}:{}", normalize_title(&p.title), year)
        }
        _ => format!("id:{}", p.id),
    }
}

/// The highest-priority grouping key of a single record: DOI, arXiv id,
/// OpenAlex id, Semantic Scholar id, normalized title + year, then the
/// adapter-local id.
pub fn grouping_key(p: &Paper) -> String {
    identifier_keys(p)
        .into_iter()
        .next()
        .unwrap_or_else(|| fallback_key(p))
}

/// Keys used to link records. Title+year and local id only apply when a
/// record carries no identifier at all.
fn identity_keys(p: &Paper) -> Vec<String> {
    let keys = identifier_keys(p);
    if keys.is_empty() {
        vec![fallback_key(p)]
    } else {
        keys
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Link two sets; the lower index stays root so each root is the first
/// record of its group.
fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Group records sharing any identity key (transitively) and merge each
/// group by left-folding in input order. Groups come out in the order of
/// their first record.
pub fn reconcile(papers: Vec<Paper>) -> Vec<Paper> {
    let n = papers.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut owner: HashMap<String, usize> = HashMap::new();

    for (i, paper) in papers.iter().enumerate() {
        for key in identity_keys(paper) {
            match owner.get(&key) {
                Some(&j) => union(&mut parent, i, j),
                None => {
                    owner.insert(key, i);
                }
            }
        }
    }

    let mut slots: Vec<Option<Paper>> = papers.into_iter().map(Some).collect();
    let mut roots: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        if root == i {
            roots.push(i);
        }
        members.entry(root).or_default().push(i);
    }

    let mut merged = Vec::with_capacity(roots.len());
    for root in roots {
        let Some(mut canonical) = slots[root].take() else {
            continue;
        };
        for &i in members.get(&root).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(dup) = slots[i].take() {
                merge_into(&mut canonical, dup);
            }
        }
        merged.push(canonical);
    }

    if merged.len() < n {
        tracing::debug!(input = n, output = merged.len(), "Reconciled duplicate records");
    }
    merged
}

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

fn keep_greater(slot: &mut Option<u64>, incoming: Option<u64>) {
    if let Some(v) = incoming {
        if slot.map_or(true, |cur| v > cur) {
            *slot = Some(v);
        }
    }
}

/// Fold `other` into `target` field by field.
pub fn merge_into(target: &mut Paper, other: Paper) {
    target.sources.extend(other.sources);

    if other.title.chars().count() > target.title.chars().count() {
        target.title = other.title;
    }

    if let Some(incoming) = other.abstract_text.filter(|a| !a.is_empty()) {
        let longer = target
            .abstract_text
            .as_ref()
            .map_or(true, |cur| incoming.chars().count() > cur.chars().count());
        if longer {
            target.abstract_text = Some(incoming);
        }
    }

    let mut seen: HashSet<String> = target.authors.iter().map(|a| a.name.clone()).collect();
    for author in other.authors {
        if seen.insert(author.name.clone()) {
            target.authors.push(author);
        }
    }

    if let Some(year) = other.year {
        if target.year.map_or(true, |cur| year > cur) {
            target.year = Some(year);
        }
    }

    fill(&mut target.venue, other.venue);

    let ids = &mut target.source_ids;
    fill(&mut ids.doi, other.source_ids.doi);
    fill(&mut ids.arxiv_id, other.source_ids.arxiv_id);
    fill(&mut ids.open_alex_id, other.source_ids.open_alex_id);
    fill(&mut ids.semantic_scholar_id, other.source_ids.semantic_scholar_id);

    let meta = &mut target.metadata;
    keep_greater(&mut meta.citation_count, other.metadata.citation_count);
    if other.metadata.is_open_access == Some(true) {
        meta.is_open_access = Some(true);
    }
    fill(&mut meta.url, other.metadata.url);
    fill(&mut meta.pdf_url, other.metadata.pdf_url);

    if let Some(incoming) = other.concepts {
        match target.concepts.as_mut() {
            Some(current) => {
                let mut ids: HashSet<String> = current.iter().map(|c| c.id.clone()).collect();
                current.extend(incoming.into_iter().filter(|c| ids.insert(c.id.clone())));
            }
            None => target.concepts = Some(incoming),
        }
    }

    if let Some(incoming) = other.s2_fields_of_study {
        match target.s2_fields_of_study.as_mut() {
            Some(current) => {
                for field in incoming {
                    if !current.contains(&field) {
                        current.push(field);
                    }
                }
            }
            None => target.s2_fields_of_study = Some(incoming),
        }
    }

    fill(&mut target.s2_tldr, other.s2_tldr);
    keep_greater(
        &mut target.s2_influential_citation_count,
        other.s2_influential_citation_count,
    );
    fill(&mut target.generated_summary, other.generated_summary);
}
