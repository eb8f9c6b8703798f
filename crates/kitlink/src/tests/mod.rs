//! Behaviour tests bound to the Gherkin features under `tests/features`.

mod lifecycle_behaviour;
mod tree_behaviour;
