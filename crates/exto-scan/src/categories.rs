//! Category registry: cached category lookups plus format templates.

use exto_core::error::ExtoResult;
use exto_core::models::category::{Category, CreateCategory};
use exto_core::models::format::{CreateFormat, Format};
use exto_core::repository::{CategoryRepository, FormatRepository, PaginatedResult, Pagination};
use exto_extract::prompt::{self, TemplateField};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::BoundedTtlCache;

pub struct CategoryRegistry<C: CategoryRepository, F: FormatRepository> {
    categories: C,
    formats: F,
    cache: BoundedTtlCache<Uuid, Category>,
}

impl<C: CategoryRepository, F: FormatRepository> CategoryRegistry<C, F> {
    pub fn new(categories: C, formats: F, cache: BoundedTtlCache<Uuid, Category>) -> Self {
        Self {
            categories,
            formats,
            cache,
        }
    }

    /// Read-through lookup. A cached category may be up to one TTL old.
    pub async fn get_by_id(&self, id: Uuid) -> ExtoResult<Category> {
        if let Some(category) = self.cache.get(&id) {
            debug!(category_id = %id, "Category cache hit");
            return Ok(category);
        }
        let category = self.categories.get_by_id(id).await?;
        self.cache.insert(id, category.clone());
        Ok(category)
    }

    /// Newest first.
    pub async fn list(&self, pagination: Pagination) -> ExtoResult<PaginatedResult<Category>> {
        self.categories.list(pagination).await
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create(&self, input: CreateCategory) -> ExtoResult<Category> {
        let category = self.categories.create(input).await?;
        info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    pub async fn create_format(&self, input: CreateFormat) -> ExtoResult<Format> {
        let category = self.get_by_id(input.category_id).await?;
        let format = self.formats.create(input).await?;

        let dangling = format.dangling_fields(&category);
        if !dangling.is_empty() {
            warn!(
                format_id = %format.id,
                category_id = %category.id,
                dangling = dangling.len(),
                "Format targets fields missing from its category"
            );
        }
        Ok(format)
    }

    pub async fn formats(&self, category_id: Uuid) -> ExtoResult<Vec<Format>> {
        self.formats.list_by_category(category_id).await
    }

    /// Extraction fields of every format of the category, in format order.
    pub async fn template_fields(&self, category_id: Uuid) -> ExtoResult<Vec<TemplateField>> {
        let formats = self.formats(category_id).await?;
        Ok(prompt::template_fields(&formats))
    }
}
