//! Scope guards and instrumentation macros.

use std::ops::{Deref, DerefMut};

use crate::tree::TimerTree;

/// RAII guard that stops its timer on drop.
///
/// Dereferences to the tree, so nested scopes and lookups go through the
/// guard while it is alive.
pub struct ScopeTimer<'a> {
    tree: &'a mut TimerTree,
}

impl<'a> ScopeTimer<'a> {
    /// Start `name` under the currently open timer.
    #[inline]
    #[must_use = "the timer stops as soon as the guard is dropped"]
    pub fn new(tree: &'a mut TimerTree, name: &str) -> Self {
        tree.start(name);
        Self { tree }
    }
}

impl Deref for ScopeTimer<'_> {
    type Target = TimerTree;

    fn deref(&self) -> &TimerTree {
        self.tree
    }
}

impl DerefMut for ScopeTimer<'_> {
    fn deref_mut(&mut self) -> &mut TimerTree {
        self.tree
    }
}

impl Drop for ScopeTimer<'_> {
    #[inline]
    fn drop(&mut self) {
        self.tree.stop();
    }
}

impl TimerTree {
    /// Start `name` and stop it when the returned guard goes out of scope.
    #[inline]
    #[must_use = "the timer stops as soon as the guard is dropped"]
    pub fn scope(&mut self, name: &str) -> ScopeTimer<'_> {
        ScopeTimer::new(self, name)
    }
}

/// Time the rest of the enclosing block.
///
/// Shadows `$tree` with a [`ScopeTimer`](crate::ScopeTimer), so nested
/// `profile_scope!` calls on the same identifier nest in the tree. When the
/// `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```ignore
/// use frametime_profiler::{profile_scope, TimerTree};
///
/// fn render(tree: &mut TimerTree) {
///     profile_scope!(tree, "Render");
///     {
///         profile_scope!(tree, "ZPrepass");
///         // ... depth-only pass
///     }
/// } // "Render" stops here
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($tree:ident, $name:expr) => {
        #[allow(unused_mut, unused_variables)]
        let mut $tree = $tree.scope($name);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($tree:ident, $name:expr) => {};
}

/// Start a timer on `$tree`. Pair with [`profile_end!`].
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_begin {
    ($tree:expr, $name:expr) => {
        $tree.start($name);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_begin {
    ($tree:expr, $name:expr) => {};
}

/// Stop the innermost timer on `$tree`.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_end {
    ($tree:expr) => {
        $tree.stop();
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_end {
    ($tree:expr) => {};
}
