use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::query::{Filter, Query};
use crate::backend::traits::TableStore;
use crate::backend::{from_row, tables, to_row};
use crate::errors::CoreError;
use crate::models::link::{LinkPatch, NewLink, UsefulLink};
use crate::models::record::Row;

use super::retry::RetryPolicy;

/// Move `moved_id` to the position currently held by `target_id`, then
/// renumber every link by its new position.
///
/// Ids are preserved and `order_index` comes out dense (`0..n`).
pub fn reorder(links: &[UsefulLink], moved_id: &str, target_id: &str) -> Result<Vec<UsefulLink>, CoreError> {
    let from = position_of(links, moved_id)?;
    let to = position_of(links, target_id)?;
    let mut reordered = links.to_vec();
    let moved = reordered.remove(from);
    reordered.insert(to, moved);
    renumber(&mut reordered);
    Ok(reordered)
}

/// Reassign `order_index` from each link's position.
pub fn renumber(links: &mut [UsefulLink]) {
    for (i, link) in links.iter_mut().enumerate() {
        link.order_index = i as u32;
    }
}

fn position_of(links: &[UsefulLink], id: &str) -> Result<usize, CoreError> {
    links
        .iter()
        .position(|l| l.id == id)
        .ok_or_else(|| CoreError::LinkNotFound(id.to_string()))
}

/// The curated link list with a locally cached copy in display order.
///
/// Structural changes (add, delete, reorder) keep `order_index` dense.
/// Every mutation loads the list first if it has not been fetched yet.
/// Reorders apply locally first; when the batch write fails, the list is
/// reloaded from the store before the error is returned.
pub struct LinkService {
    store: Arc<dyn TableStore>,
    retry: RetryPolicy,
    links: Vec<UsefulLink>,
    loaded: bool,
}

impl LinkService {
    pub fn new(store: Arc<dyn TableStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            links: Vec::new(),
            loaded: false,
        }
    }

    /// Cached links, by `order_index`.
    #[must_use]
    pub fn links(&self) -> &[UsefulLink] {
        &self.links
    }

    /// Reload the cache from the store.
    pub async fn fetch(&mut self) -> Result<&[UsefulLink], CoreError> {
        let rows = self
            .store
            .select(tables::USEFUL_LINKS, &Query::all().order_by("order_index", true))
            .await
            .inspect_err(|e| error!("Error fetching useful links: {e}"))?;
        self.links = rows
            .into_iter()
            .map(from_row::<UsefulLink>)
            .collect::<Result<_, _>>()?;
        self.loaded = true;
        Ok(&self.links)
    }

    async fn ensure_loaded(&mut self) -> Result<(), CoreError> {
        if !self.loaded {
            self.fetch().await?;
        }
        Ok(())
    }

    /// Append a link at the end of the list.
    pub async fn add(&mut self, link: NewLink) -> Result<UsefulLink, CoreError> {
        link.validate()?;
        self.ensure_loaded().await?;
        let mut row = to_row(&link)?;
        row.insert("order_index".into(), self.links.len().into());

        let store = Arc::clone(&self.store);
        let inserted = self
            .retry
            .run("add link", || {
                let store = Arc::clone(&store);
                let row = row.clone();
                async move { store.insert(tables::USEFUL_LINKS, vec![row]).await }
            })
            .await
            .inspect_err(|e| error!("Error adding useful link: {e}"))?;

        let created: UsefulLink = single(inserted)?;
        info!("Added link '{}' at position {}", created.title, created.order_index);
        self.links.push(created.clone());
        Ok(created)
    }

    /// Edit title, URL or description of a link.
    pub async fn update(&mut self, id: &str, patch: &LinkPatch) -> Result<UsefulLink, CoreError> {
        patch.validate()?;
        self.ensure_loaded().await?;
        let idx = position_of(&self.links, id)?;
        if patch.is_empty() {
            return Ok(self.links[idx].clone());
        }
        let row = to_row(patch)?;
        let filter = Filter::eq("id", id);

        let store = Arc::clone(&self.store);
        let updated = self
            .retry
            .run("update link", || {
                let store = Arc::clone(&store);
                let row = row.clone();
                let filter = filter.clone();
                async move { store.update(tables::USEFUL_LINKS, &filter, row).await }
            })
            .await
            .inspect_err(|e| error!("Error updating useful link: {e}"))?;

        let updated: UsefulLink = match updated.into_iter().next() {
            Some(row) => from_row(row)?,
            None => return Err(CoreError::LinkNotFound(id.to_string())),
        };
        self.links[idx] = updated.clone();
        Ok(updated)
    }

    /// Remove a link and close the gap it leaves in `order_index`.
    pub async fn delete(&mut self, id: &str) -> Result<(), CoreError> {
        self.ensure_loaded().await?;
        let idx = position_of(&self.links, id)?;
        let filter = Filter::eq("id", id);

        let store = Arc::clone(&self.store);
        self.retry
            .run("delete link", || {
                let store = Arc::clone(&store);
                let filter = filter.clone();
                async move { store.delete(tables::USEFUL_LINKS, &filter).await }
            })
            .await
            .inspect_err(|e| error!("Error deleting useful link: {e}"))?;

        self.links.remove(idx);
        if idx < self.links.len() {
            renumber(&mut self.links);
            let shifted = self.links[idx..].to_vec();
            self.persist(&shifted).await?;
        }
        Ok(())
    }

    /// Drag `moved_id` onto `target_id` and persist the full new order.
    pub async fn reorder(&mut self, moved_id: &str, target_id: &str) -> Result<(), CoreError> {
        self.ensure_loaded().await?;
        let reordered = reorder(&self.links, moved_id, target_id)?;
        self.links = reordered.clone();
        self.persist(&reordered).await
    }

    /// Write the given links in one batch. On failure the cache is
    /// reloaded from the store and the write error returned.
    async fn persist(&mut self, links: &[UsefulLink]) -> Result<(), CoreError> {
        let rows = links.iter().map(to_row).collect::<Result<Vec<Row>, _>>()?;

        let store = Arc::clone(&self.store);
        let result = self
            .retry
            .run("reorder links", || {
                let store = Arc::clone(&store);
                let rows = rows.clone();
                async move { store.upsert(tables::USEFUL_LINKS, rows, "id").await }
            })
            .await;

        if let Err(e) = result {
            error!("Error reordering links: {e}");
            if let Err(reload) = self.fetch().await {
                warn!("Could not reload links after failed reorder: {reload}");
            }
            return Err(e);
        }
        Ok(())
    }
}

fn single(rows: Vec<Row>) -> Result<UsefulLink, CoreError> {
    match rows.into_iter().next() {
        Some(row) => from_row(row),
        None => Err(CoreError::Store {
            table: tables::USEFUL_LINKS.to_string(),
            message: "insert returned no row".into(),
        }),
    }
}
