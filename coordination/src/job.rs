//! Jobs, candidates and the roster they are selected from

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{DispatchError, DispatchResult};

/// Opaque recipient handle (e.g. a messaging account id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecipientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

macro_rules! recipient_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for RecipientId {
            fn from(id: $t) -> Self {
                Self(id.to_string())
            }
        })*
    };
}

// Messaging platforms commonly use numeric account ids
recipient_from_int!(i32, i64, u32, u64);

/// A recipient eligible to receive a job proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: RecipientId,
    /// Display name shown in menus and reports
    pub name: String,
}

impl Candidate {
    pub fn new(id: impl Into<RecipientId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// One named field of a job record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobField {
    pub name: String,
    pub value: String,
}

/// Immutable job record: field name → display value, in source order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    fields: Vec<JobField>,
}

impl Job {
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| JobField {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[JobField] {
        &self.fields
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render every field on its own line, in the job's field order.
    ///
    /// Values are wrapped in `*` so chat transports render them bold.
    pub fn format_summary(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}: *{}*", f.name, f.value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Set of candidates with unique identities, in roster order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roster {
    candidates: Vec<Candidate>,
}

impl Roster {
    /// Build a roster, rejecting duplicate identities
    pub fn new(candidates: Vec<Candidate>) -> DispatchResult<Self> {
        let mut seen = HashSet::new();
        for candidate in &candidates {
            if !seen.insert(candidate.id.clone()) {
                return Err(DispatchError::DuplicateCandidate {
                    id: candidate.id.clone(),
                });
            }
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, id: &RecipientId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| &c.id == id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Start an empty selection over this roster
    pub fn selection(&self) -> Selection<'_> {
        Selection {
            roster: self,
            selected: Vec::new(),
        }
    }

    /// Resolve ids into candidates, keeping the order given
    pub fn select_ids<'a, I>(&self, ids: I) -> DispatchResult<Vec<Candidate>>
    where
        I: IntoIterator<Item = &'a RecipientId>,
    {
        let mut selection = self.selection();
        for id in ids {
            selection.select(id)?;
        }
        selection.finalize()
    }
}

/// Candidates picked from a roster, remembered in the order they were picked
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    roster: &'a Roster,
    selected: Vec<RecipientId>,
}

impl<'a> Selection<'a> {
    /// Select if unselected, deselect otherwise. Returns the new state.
    pub fn toggle(&mut self, id: &RecipientId) -> DispatchResult<bool> {
        if self.is_selected(id) {
            self.deselect(id);
            Ok(false)
        } else {
            self.select(id)?;
            Ok(true)
        }
    }

    /// Add a candidate at the end of the selection; selecting twice is a no-op
    pub fn select(&mut self, id: &RecipientId) -> DispatchResult<()> {
        if self.roster.get(id).is_none() {
            return Err(DispatchError::UnknownCandidate { id: id.clone() });
        }
        if !self.is_selected(id) {
            self.selected.push(id.clone());
        }
        Ok(())
    }

    pub fn deselect(&mut self, id: &RecipientId) {
        self.selected.retain(|s| s != id);
    }

    pub fn is_selected(&self, id: &RecipientId) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Menu label for a candidate: `+Name` when selected
    pub fn label(&self, candidate: &Candidate) -> String {
        if self.is_selected(&candidate.id) {
            format!("+{}", candidate.name)
        } else {
            candidate.name.clone()
        }
    }

    /// Selected candidates in selection order
    pub fn finalize(&self) -> DispatchResult<Vec<Candidate>> {
        if self.selected.is_empty() {
            return Err(DispatchError::InvalidSelection);
        }
        Ok(self
            .selected
            .iter()
            .filter_map(|id| self.roster.get(id).cloned())
            .collect())
    }
}
