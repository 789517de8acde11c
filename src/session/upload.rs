use chrono::Utc;

use crate::{
    foundation::{
        core::{RawPlacement, SourceImage, validate_file_name},
        error::{CustomizerError, CustomizerResult},
    },
    render::pipeline::ImagePipeline,
    session::identity::{IdentityResolver, ResolutionOutcome},
    storage::gateway::{FolderKey, SessionStore},
};

/// Upload as handed over by the HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub session_id: String,
    pub product_id: String,
    pub placement: RawPlacement,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct UploadOutcome {
    pub final_session_id: String,
    pub changed: bool,
    pub reason: String,
    pub outcome: ResolutionOutcome,
    pub original_url: String,
    pub shaped_url: String,
    /// Stored paths, for callers that fetch bytes directly.
    pub original_path: String,
    pub shaped_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FulfillmentUrls {
    pub original_url: Option<String>,
    pub shaped_url: Option<String>,
}

/// Resolve identity, render, persist.
pub struct UploadService {
    resolver: IdentityResolver,
    pipeline: ImagePipeline,
    store: SessionStore,
}

impl UploadService {
    pub fn new(resolver: IdentityResolver, pipeline: ImagePipeline, store: SessionStore) -> Self {
        Self {
            resolver,
            pipeline,
            store,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[tracing::instrument(
        skip(self, req),
        fields(session_id = %req.session_id, product_id = %req.product_id)
    )]
    pub async fn upload(&self, req: UploadRequest) -> CustomizerResult<UploadOutcome> {
        let params = req.placement.into_params()?;
        let source = SourceImage::new(req.image_bytes, &req.mime_type)?;
        self.store.ensure_available()?;

        let identity = self.resolver.resolve(&req.session_id, &req.product_id).await?;
        let folder = identity.folder()?;

        let pipeline = self.pipeline;
        let (source, shaped) = tokio::task::spawn_blocking(move || {
            let shaped = pipeline.render_shaped_png(&source, &params);
            (source, shaped)
        })
        .await
        .map_err(|e| CustomizerError::image_processing(params.shape.as_str(), e))?;
        let shaped = shaped?;

        let content_type = source.mime().as_str();
        let original_path = self
            .store
            .put_original(&folder, source.into_bytes(), content_type)
            .await?;
        let shaped_path = self
            .store
            .put_shaped(&folder, params.shape, shaped, Utc::now())
            .await?;

        let original_url = self.store.public_url(&original_path)?;
        let shaped_url = self.store.public_url(&shaped_path)?;

        tracing::info!(%folder, %shaped_path, "upload stored");
        Ok(UploadOutcome {
            final_session_id: identity.final_session_id,
            changed: identity.changed,
            reason: identity.reason,
            outcome: identity.outcome,
            original_url,
            shaped_url,
            original_path,
            shaped_path,
        })
    }

    /// Store a file in the bare session folder (no product, no rendering).
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn upload_session_asset(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> CustomizerResult<String> {
        let folder = FolderKey::session(session_id)?;
        validate_file_name(file_name)?;
        if bytes.is_empty() {
            return Err(CustomizerError::validation("asset payload is empty"));
        }
        self.store.ensure_available()?;

        let path = self
            .store
            .put_file(&folder, file_name, bytes, mime_type)
            .await?;
        self.store.public_url(&path)
    }

    /// Cache-busted URLs of the current original and latest shaped render.
    pub async fn fetch_for_fulfillment(
        &self,
        session_id: &str,
        product_id: &str,
    ) -> CustomizerResult<FulfillmentUrls> {
        let folder = FolderKey::session_product(session_id, product_id)?;
        let assets = self.store.lookup_assets(&folder).await?;
        Ok(FulfillmentUrls {
            original_url: assets
                .original
                .as_deref()
                .map(|p| self.store.public_url(p))
                .transpose()?,
            shaped_url: assets
                .latest_shaped
                .as_deref()
                .map(|p| self.store.public_url(p))
                .transpose()?,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/upload.rs"]
mod tests;
