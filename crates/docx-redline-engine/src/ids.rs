use crate::package::DocumentPackage;

/// Hands out `w:id` values for one document.
///
/// Revisions and comments draw from the same sequence, seeded above every
/// numeric id already in the package, so no two allocated ids collide with
/// each other or with existing markup.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn for_package(package: &DocumentPackage) -> Self {
        Self::starting_at(package.id_seed())
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> u64 {
        self.next
    }
}
