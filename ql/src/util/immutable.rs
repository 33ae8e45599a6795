use std::ops::Deref;

/// Read-only wrapper: the value is fixed at construction and only handed out by shared reference.
#[derive(Debug, Clone)]
pub struct Immutable<T>(T);

impl<T> Immutable<T> {
    pub fn new(value: T) -> Self { Self(value) }
}

impl<T> Deref for Immutable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target { &self.0 }
}
