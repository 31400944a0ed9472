//! Duplicate detection and resolution
//!
//! Exact duplicates never coexist: the store keys records by content
//! fingerprint, so two byte-different encodes of the same stream already
//! merge into one record. This module handles the remaining tier:
//! near-duplicates, grouped when their acoustic signatures are similar AND
//! their durations are close; the duration guard keeps different remixes
//! of similar energy apart.
//!
//! Groups are derived state, recomputable from track records at any time,
//! and never the source of truth for identity. Policies only propose
//! actions; deleting or merging files is an external, explicitly confirmed
//! operation.

use crate::config::DuplicateConfig;
use crate::model::{AnalysisStatus, Fingerprint, TrackRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How a duplicate group's members are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// Propose no removals
    KeepAll,
    /// Keep the member with the highest sample rate, breaking ties by
    /// larger file size, then earliest-seen record, then fingerprint
    KeepHighestQuality,
    /// Keep the member with the most recent file modification time
    KeepNewest,
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionPolicy::KeepAll => "keep-all",
            ResolutionPolicy::KeepHighestQuality => "keep-highest-quality",
            ResolutionPolicy::KeepNewest => "keep-newest",
        };
        f.write_str(name)
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-all" => Ok(ResolutionPolicy::KeepAll),
            "keep-highest-quality" => Ok(ResolutionPolicy::KeepHighestQuality),
            "keep-newest" => Ok(ResolutionPolicy::KeepNewest),
            other => Err(format!(
                "unknown policy '{other}' (expected keep-all, keep-highest-quality or keep-newest)"
            )),
        }
    }
}

/// A set of near-duplicate track records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The member the applied policy keeps
    pub representative: Fingerprint,
    /// All members, sorted by fingerprint
    pub members: Vec<Fingerprint>,
    /// Policy that chose the representative
    pub policy: ResolutionPolicy,
}

/// A non-destructive suggestion for one group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedAction {
    Keep {
        fingerprint: Fingerprint,
    },
    /// Candidate for removal; lists the paths that would be affected
    Remove {
        fingerprint: Fingerprint,
        paths: Vec<PathBuf>,
    },
}

/// Groups near-duplicate records and applies the configured policy
pub struct DuplicateResolver<'a> {
    config: &'a DuplicateConfig,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(config: &'a DuplicateConfig) -> Self {
        Self { config }
    }

    /// Partition analyzed records into duplicate groups
    ///
    /// Greedy clustering in deterministic order (first seen, then
    /// fingerprint): each record joins the first group whose anchor is
    /// within the similarity threshold and duration tolerance.
    pub fn find_groups(&self, tracks: &[TrackRecord]) -> Vec<DuplicateGroup> {
        let mut candidates: Vec<&TrackRecord> = tracks
            .iter()
            .filter(|record| {
                record.status == AnalysisStatus::Analyzed
                    && record.signature.is_some()
                    && !record.is_tombstoned()
            })
            .collect();
        candidates.sort_by_key(|record| (record.first_seen, record.fingerprint));

        let mut clusters: Vec<Vec<&TrackRecord>> = Vec::new();
        for record in candidates {
            let signature = record.signature.as_ref().expect("filtered above");

            let joined = clusters.iter_mut().find(|cluster| {
                let anchor = cluster[0];
                let anchor_signature = anchor.signature.as_ref().expect("filtered above");
                let similarity = signature.similarity(anchor_signature);
                let duration_delta = (record.duration_secs - anchor.duration_secs).abs();
                similarity >= self.config.similarity_threshold
                    && duration_delta <= self.config.duration_tolerance_secs
            });

            match joined {
                Some(cluster) => cluster.push(record),
                None => clusters.push(vec![record]),
            }
        }

        clusters
            .into_iter()
            .filter(|cluster| cluster.len() > 1)
            .map(|cluster| {
                let representative = select_keeper(self.config.policy, &cluster);
                let mut members: Vec<Fingerprint> =
                    cluster.iter().map(|record| record.fingerprint).collect();
                members.sort();
                log::debug!(
                    "Duplicate group of {}: representative {}",
                    members.len(),
                    representative
                );
                DuplicateGroup {
                    representative,
                    members,
                    policy: self.config.policy,
                }
            })
            .collect()
    }

    /// Apply the group's policy and emit proposed actions
    ///
    /// Pure with respect to the records: nothing is deleted or merged here.
    pub fn propose(&self, group: &DuplicateGroup, tracks: &[TrackRecord]) -> Vec<ProposedAction> {
        group
            .members
            .iter()
            .map(|fingerprint| {
                let keep = group.policy == ResolutionPolicy::KeepAll
                    || *fingerprint == group.representative;
                if keep {
                    ProposedAction::Keep {
                        fingerprint: *fingerprint,
                    }
                } else {
                    let paths = tracks
                        .iter()
                        .find(|record| record.fingerprint == *fingerprint)
                        .map(|record| record.paths.keys().cloned().collect())
                        .unwrap_or_default();
                    ProposedAction::Remove {
                        fingerprint: *fingerprint,
                        paths,
                    }
                }
            })
            .collect()
    }
}

/// Pure policy function: which member of a cluster survives
///
/// Tie-breaks are total and documented on [`ResolutionPolicy`]; the final
/// fingerprint comparison makes every ordering deterministic.
fn select_keeper(policy: ResolutionPolicy, cluster: &[&TrackRecord]) -> Fingerprint {
    let mut ordered: Vec<&&TrackRecord> = cluster.iter().collect();
    match policy {
        ResolutionPolicy::KeepAll => {
            ordered.sort_by_key(|record| (record.first_seen, record.fingerprint));
        }
        ResolutionPolicy::KeepHighestQuality => {
            ordered.sort_by(|a, b| {
                b.sample_rate
                    .cmp(&a.sample_rate)
                    .then(b.largest_file_size().cmp(&a.largest_file_size()))
                    .then(a.first_seen.cmp(&b.first_seen))
                    .then(a.fingerprint.cmp(&b.fingerprint))
            });
        }
        ResolutionPolicy::KeepNewest => {
            ordered.sort_by(|a, b| {
                b.newest_mtime()
                    .cmp(&a.newest_mtime())
                    .then(a.fingerprint.cmp(&b.fingerprint))
            });
        }
    }
    ordered[0].fingerprint
}
