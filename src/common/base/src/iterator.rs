/// TryIterator is a fallible, synchronous cursor. `Ok(None)` marks the end.
pub trait TryIterator {
    type Item;
    type Error;

    fn try_next(&mut self) -> Result<Option<Self::Item>, Self::Error>;

    /// Drains the remaining items, stopping at the first error.
    fn try_collect(mut self) -> Result<Vec<Self::Item>, Self::Error>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        while let Some(item) = self.try_next()? {
            items.push(item);
        }
        Ok(items)
    }
}

/// AsyncIterator is the async counterpart of [`TryIterator`], used by cursors
/// that pull their bytes from an async byte source.
#[async_trait]
pub trait AsyncIterator: Send {
    type Item: Send;
    type Error: Send;

    async fn try_next(&mut self) -> Result<Option<Self::Item>, Self::Error>;

    /// Drains the remaining items, stopping at the first error.
    async fn try_collect(mut self) -> Result<Vec<Self::Item>, Self::Error>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }
}
