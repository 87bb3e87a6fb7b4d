//! Snapshot state cell with change subscription

use tokio::sync::watch;

/// Holds the current value of a piece of state and notifies subscribers
/// every time it is replaced or modified.
///
/// Readers never hold the value across an `.await`; use [`Observable::get`]
/// for an owned snapshot or [`Observable::with`] for a borrowed look.
#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(value);
        Self { sender }
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Mutate the value in place and notify subscribers.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut result = None;
        self.sender.send_modify(|value| result = Some(f(value)));
        // send_modify always runs the closure exactly once
        match result {
            Some(result) => result,
            None => unreachable!("send_modify skipped its closure"),
        }
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone> Observable<T> {
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_replacements() {
        let cell = Observable::new(1);
        let mut rx = cell.subscribe();

        cell.set(2);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);

        let doubled = cell.modify(|v| {
            *v *= 2;
            *v
        });
        assert_eq!(doubled, 4);
        rx.changed().await.unwrap();
        assert_eq!(cell.get(), 4);
    }
}
