//! Resource bundles.
//!
//! A [`ResourceBundle`] maps a resource name to a non-negative count. Zero
//! counts are never stored, so two bundles holding the same resources always
//! compare equal regardless of how they were built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A multiset of named resources with non-negative counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct ResourceBundle(BTreeMap<String, u32>);

/// Outcome of [`ResourceBundle::subtract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subtraction {
    /// The minuend held at least as much of every resource.
    Covered(ResourceBundle),
    /// At least one resource would have gone negative.
    Deficit {
        /// Result with every negative count clamped to zero.
        clamped: ResourceBundle,
        /// How much of each resource was missing.
        shortfall: ResourceBundle,
    },
}

impl Subtraction {
    /// Whether the subtraction was fully covered.
    pub const fn is_covered(&self) -> bool {
        matches!(self, Self::Covered(_))
    }

    /// The clamped result, discarding any shortfall.
    pub fn into_clamped(self) -> ResourceBundle {
        match self {
            Self::Covered(bundle) | Self::Deficit { clamped: bundle, .. } => bundle,
        }
    }
}

impl ResourceBundle {
    /// Create an empty bundle.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert, mostly for tests and fixtures.
    #[must_use]
    pub fn with(mut self, resource: impl Into<String>, quantity: u32) -> Self {
        self.add(resource, quantity);
        self
    }

    /// Count held for `resource` (zero when absent).
    pub fn get(&self, resource: &str) -> u32 {
        self.0.get(&normalize_ref(resource)).copied().unwrap_or(0)
    }

    /// Overwrite the count for `resource`. Setting zero removes the entry.
    pub fn set(&mut self, resource: impl Into<String>, quantity: u32) {
        let resource = normalize(resource.into());
        if quantity == 0 {
            self.0.remove(&resource);
        } else {
            self.0.insert(resource, quantity);
        }
    }

    /// Add `quantity` units of `resource`, saturating at `u32::MAX`.
    pub fn add(&mut self, resource: impl Into<String>, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let entry = self.0.entry(normalize(resource.into())).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Remove `resource` entirely and return its previous count.
    pub fn remove(&mut self, resource: &str) -> u32 {
        self.0.remove(&normalize_ref(resource)).unwrap_or(0)
    }

    /// Whether the bundle holds nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct resources held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(resource, count)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, qty)| (name.as_str(), *qty))
    }

    /// Iterate resource names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether `resource` is present with a non-zero count.
    pub fn contains(&self, resource: &str) -> bool {
        self.0.contains_key(&normalize_ref(resource))
    }

    /// Sum of all counts.
    pub fn total_units(&self) -> u64 {
        self.0
            .values()
            .fold(0_u64, |acc, qty| acc.saturating_add(u64::from(*qty)))
    }

    /// Add every count in `other` into `self`, saturating.
    pub fn merge(&mut self, other: &Self) {
        for (name, qty) in other.iter() {
            self.add(name, qty);
        }
    }

    /// Subtract `other` from `self`.
    ///
    /// Never produces a negative count: when some resource would go below
    /// zero the result is [`Subtraction::Deficit`] carrying both the clamped
    /// bundle and the missing amounts.
    pub fn subtract(&self, other: &Self) -> Subtraction {
        let mut clamped = self.clone();
        let mut shortfall = Self::new();
        for (name, wanted) in other.iter() {
            let held = self.get(name);
            clamped.set(name, held.saturating_sub(wanted));
            shortfall.set(name, wanted.saturating_sub(held));
        }
        if shortfall.is_empty() {
            Subtraction::Covered(clamped)
        } else {
            Subtraction::Deficit { clamped, shortfall }
        }
    }

    /// `self - other` with every negative count clamped to zero.
    #[must_use]
    pub fn saturating_sub(&self, other: &Self) -> Self {
        self.subtract(other).into_clamped()
    }

    /// Whether `self` holds at least as much of every resource in `other`.
    pub fn covers(&self, other: &Self) -> bool {
        other.iter().all(|(name, qty)| self.get(name) >= qty)
    }

    /// Per-resource minimum of the two bundles.
    #[must_use]
    pub fn intersect_min(&self, other: &Self) -> Self {
        self.iter()
            .map(|(name, qty)| (name, qty.min(other.get(name))))
            .collect()
    }

    /// Clamp every count to at most `cap`.
    #[must_use]
    pub fn capped(&self, cap: u32) -> Self {
        self.iter().map(|(name, qty)| (name, qty.min(cap))).collect()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for ResourceBundle {
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        let mut bundle = Self::new();
        for (name, qty) in iter {
            bundle.add(name, qty);
        }
        bundle
    }
}

impl From<BTreeMap<String, u32>> for ResourceBundle {
    fn from(map: BTreeMap<String, u32>) -> Self {
        map.into_iter().collect()
    }
}

impl From<ResourceBundle> for BTreeMap<String, u32> {
    fn from(bundle: ResourceBundle) -> Self {
        bundle.0
    }
}

impl core::fmt::Display for ResourceBundle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("nothing");
        }
        let mut first = true;
        for (name, qty) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{qty} {name}")?;
            first = false;
        }
        Ok(())
    }
}

/// Resource names are compared case-insensitively and without padding.
fn normalize(name: String) -> String {
    if is_normalized(&name) {
        name
    } else {
        name.trim().to_lowercase()
    }
}

fn normalize_ref(name: &str) -> String {
    if is_normalized(name) {
        name.to_owned()
    } else {
        name.trim().to_lowercase()
    }
}

fn is_normalized(name: &str) -> bool {
    name.trim().len() == name.len() && !name.chars().any(char::is_uppercase)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_counts_are_not_stored() {
        let mut bundle = ResourceBundle::new().with("wood", 3);
        bundle.set("wood", 0);
        bundle.add("stone", 0);
        assert!(bundle.is_empty());
        assert_eq!(bundle, ResourceBundle::new());
    }

    #[test]
    fn names_are_normalized() {
        let bundle = ResourceBundle::new().with(" Wood ", 2).with("wood", 1);
        assert_eq!(bundle.get("wood"), 3);
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn subtract_reports_shortfall() {
        let held = ResourceBundle::new().with("wood", 5).with("stone", 1);
        let wanted = ResourceBundle::new().with("wood", 2).with("stone", 4);
        match held.subtract(&wanted) {
            Subtraction::Deficit { clamped, shortfall } => {
                assert_eq!(clamped, ResourceBundle::new().with("wood", 3));
                assert_eq!(shortfall, ResourceBundle::new().with("stone", 3));
            }
            Subtraction::Covered(_) => panic!("expected a deficit"),
        }
    }

    #[test]
    fn subtract_covered() {
        let held = ResourceBundle::new().with("wood", 5);
        let result = held.subtract(&ResourceBundle::new().with("wood", 5));
        assert_eq!(result, Subtraction::Covered(ResourceBundle::new()));
    }

    #[test]
    fn merge_saturates() {
        let mut bundle = ResourceBundle::new().with("gems", u32::MAX);
        bundle.merge(&ResourceBundle::new().with("gems", 10));
        assert_eq!(bundle.get("gems"), u32::MAX);
    }

    #[test]
    fn intersect_and_cover() {
        let a = ResourceBundle::new().with("wood", 5).with("iron", 2);
        let b = ResourceBundle::new().with("wood", 3).with("stone", 9);
        assert_eq!(a.intersect_min(&b), ResourceBundle::new().with("wood", 3));
        assert!(a.covers(&ResourceBundle::new().with("iron", 2)));
        assert!(!a.covers(&b));
    }

    #[test]
    fn display_lists_counts() {
        let bundle = ResourceBundle::new().with("wood", 5).with("iron", 2);
        assert_eq!(bundle.to_string(), "2 iron, 5 wood");
        assert_eq!(ResourceBundle::new().to_string(), "nothing");
    }

    #[test]
    fn deserialize_drops_zero_entries() {
        let bundle: ResourceBundle =
            serde_json::from_str(r#"{"wood": 0, "stone": 4}"#).unwrap();
        assert_eq!(bundle, ResourceBundle::new().with("stone", 4));
    }

    fn bundle_strategy() -> impl Strategy<Value = ResourceBundle> {
        prop::collection::btree_map("[a-e]", 0_u32..50, 0..5).prop_map(ResourceBundle::from)
    }

    proptest! {
        #[test]
        fn subtract_never_goes_negative(a in bundle_strategy(), b in bundle_strategy()) {
            let clamped = a.saturating_sub(&b);
            for (name, qty) in clamped.iter() {
                prop_assert!(qty > 0);
                prop_assert!(qty <= a.get(name));
            }
        }

        #[test]
        fn covered_subtraction_restores_by_merge(a in bundle_strategy(), b in bundle_strategy()) {
            if let Subtraction::Covered(mut rest) = a.subtract(&b) {
                rest.merge(&b);
                prop_assert_eq!(rest, a);
            }
        }
    }
}
