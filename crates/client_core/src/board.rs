use std::collections::HashMap;

use shared::{
    domain::{Category, CategoryId, Item, ItemId},
    protocol::AnswerPair,
};

/// The placement state of one play: the pool of unplaced items plus one
/// list per category. The board owns every item, so an item is always in
/// exactly one of {pool, one category list}.
#[derive(Debug, Clone)]
pub struct Board {
    pool: Vec<Item>,
    placements: HashMap<CategoryId, Vec<Item>>,
    category_order: Vec<CategoryId>,
    total_items: u32,
}

impl Board {
    /// Flattens the loaded categories into the pool, stamping each item's
    /// correct category from the category that owns it. Placement lists
    /// start empty for every category id.
    pub fn new(categories: &[Category]) -> Self {
        let mut pool = Vec::new();
        let mut placements = HashMap::new();
        let mut category_order = Vec::new();

        for category in categories {
            placements.insert(category.id.clone(), Vec::new());
            category_order.push(category.id.clone());
            for item in &category.items {
                let mut item = item.clone();
                item.correct_category_id = category.id.clone();
                pool.push(item);
            }
        }

        let total_items = pool.len() as u32;
        Self {
            pool,
            placements,
            category_order,
            total_items,
        }
    }

    /// Shuffles the pool in place. Called once at load, before play starts.
    pub fn shuffle_pool<R: rand::Rng>(&mut self, rng: &mut R) {
        use rand::seq::SliceRandom;
        self.pool.shuffle(rng);
    }

    /// Moves an item into a category bucket, removing it from the pool and
    /// from any bucket it already occupies. Unknown item or category ids
    /// are silent no-ops; duplicate drops reconcile instead of erroring.
    pub fn place(&mut self, item_id: &ItemId, category_id: &CategoryId) -> bool {
        if !self.placements.contains_key(category_id) {
            return false;
        }
        let Some(item) = self.take(item_id) else {
            return false;
        };
        self.placements
            .get_mut(category_id)
            .map(|bucket| bucket.push(item))
            .is_some()
    }

    /// Moves an item back to the pool. No-op for unknown ids or items
    /// already in the pool.
    pub fn return_to_pool(&mut self, item_id: &ItemId) -> bool {
        if self.pool.iter().any(|item| &item.id == item_id) {
            return false;
        }
        let Some(item) = self.take(item_id) else {
            return false;
        };
        self.pool.push(item);
        true
    }

    /// True once every item has been placed somewhere, correct or not.
    pub fn is_complete(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn pool(&self) -> &[Item] {
        &self.pool
    }

    pub fn placed_in(&self, category_id: &CategoryId) -> &[Item] {
        self.placements
            .get(category_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn category_ids(&self) -> &[CategoryId] {
        &self.category_order
    }

    /// Full item-set size fixed at load. Fallback scoring divides by this,
    /// not by the number of placed items, so an incomplete submission is
    /// scored against the whole puzzle.
    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    /// One `(item_id, category_id)` pair per placed item, in category order.
    pub fn answers(&self) -> Vec<AnswerPair> {
        let mut answers = Vec::new();
        for category_id in &self.category_order {
            for item in self.placed_in(category_id) {
                answers.push(AnswerPair {
                    item_id: item.id.clone(),
                    category_id: category_id.clone(),
                });
            }
        }
        answers
    }

    /// Placed items sitting in the bucket they belong to.
    pub fn correct_placements(&self) -> u32 {
        self.category_order
            .iter()
            .map(|category_id| {
                self.placed_in(category_id)
                    .iter()
                    .filter(|item| &item.correct_category_id == category_id)
                    .count() as u32
            })
            .sum()
    }

    /// Non-empty hints across the full item set, in load order.
    pub fn hints(&self) -> Vec<String> {
        let mut hints: Vec<String> = Vec::new();
        let placed = self
            .category_order
            .iter()
            .flat_map(|category_id| self.placed_in(category_id).iter());
        for item in self.pool.iter().chain(placed) {
            if let Some(hint) = &item.hint {
                let hint = hint.trim();
                if !hint.is_empty() {
                    hints.push(hint.to_string());
                }
            }
        }
        hints
    }

    /// Removes the item from wherever it currently sits. Removal from every
    /// location guards against duplicate drag events ever leaving two
    /// copies behind.
    fn take(&mut self, item_id: &ItemId) -> Option<Item> {
        let mut found = None;
        if let Some(pos) = self.pool.iter().position(|item| &item.id == item_id) {
            found = Some(self.pool.remove(pos));
        }
        for bucket in self.placements.values_mut() {
            if let Some(pos) = bucket.iter().position(|item| &item.id == item_id) {
                let item = bucket.remove(pos);
                if found.is_none() {
                    found = Some(item);
                }
            }
        }
        found
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
