/// A value that is produced from its source on first access and kept after.
#[derive(Debug)]
pub enum Deferred<T, S> {
    Unloaded(S),
    Loaded(T),
}

impl<T, S> Deferred<T, S> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Deferred::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Deferred::Loaded(x) => Some(x),
            Deferred::Unloaded(_) => None,
        }
    }

    pub fn source(&self) -> Option<&S> {
        match self {
            Deferred::Loaded(_) => None,
            Deferred::Unloaded(x) => Some(x),
        }
    }

    /// Runs `load` at most once. A failed load leaves the source in place so
    /// a later call can try again.
    pub fn force<E, F>(&mut self, load: F) -> Result<&T, E>
    where
        F: FnOnce(&S) -> Result<T, E>,
    {
        if let Deferred::Unloaded(source) = self {
            let value = load(source)?;
            *self = Deferred::Loaded(value);
        }

        match self {
            Deferred::Loaded(x) => Ok(x),
            Deferred::Unloaded(_) => unreachable!("deferred value was just loaded"),
        }
    }
}
