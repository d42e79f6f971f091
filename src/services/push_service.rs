//! Push admission: decide whether a signed recipe push may create or
//! overwrite a container, and persist the resulting RecipeFile.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. an `Authorization` header is present
//! 2. it names a known principal
//! 3. the request signature covers `build|collection|ts|name|tag|`
//! 4. the principal holds the global create capability
//! 5. the collection exists
//! 6. the principal owns the collection
//! 7. the principal has push permission on the collection
//! 8. the target `(collection, name, tag)` is not frozen

use super::registry_service::{RegistryError, RegistryResult, RegistryService};
use crate::{
    auth::signature::{self, AuthHeader},
    models::{collection::Collection, recipe::RecipeFile, user::User},
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_TAG: &str = "latest";
pub const BUILD_PURPOSE: &str = "build";
const DEFAULT_RECIPE_NAME: &str = "Singularity";
const MAX_NAME_LEN: usize = 128;

/// An uploaded recipe held in a temp file until admission decides.
#[derive(Debug)]
pub struct StagedRecipe {
    tmp_path: PathBuf,
    pub filename: String,
    pub checksum: String,
    pub size_bytes: i64,
}

/// Everything a push carries.
#[derive(Debug, Default)]
pub struct PushRequest {
    pub authorization: Option<String>,
    pub collection: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub datafile: Option<StagedRecipe>,
}

impl RegistryService {
    /// Stream an uploaded recipe to a temp file, computing its MD5.
    pub async fn stage_recipe<S>(&self, filename: &str, stream: S) -> RegistryResult<StagedRecipe>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let staging = self.recipes_root().join(".staging");
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(RegistryError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(RegistryError::Io(err));
            }
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(RegistryError::Io(err));
        }

        Ok(StagedRecipe {
            tmp_path,
            filename: sanitize_filename(filename),
            checksum: format!("{:x}", digest.compute()),
            size_bytes,
        })
    }

    pub async fn discard_staged(&self, staged: StagedRecipe) {
        if let Err(err) = fs::remove_file(&staged.tmp_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to discard {}: {}", staged.tmp_path.display(), err);
            }
        }
    }

    /// Run push admission and, on success, persist the RecipeFile.
    ///
    /// The staged datafile is moved into place on success and removed on any
    /// failure.
    pub async fn admit_push(&self, mut request: PushRequest) -> RegistryResult<RecipeFile> {
        let staged = request.datafile.take();
        let admitted = self.check_push(&request, staged.is_some()).await;

        let (owner, collection, name, tag) = match admitted {
            Ok(admitted) => admitted,
            Err(err) => {
                if let Some(staged) = staged {
                    self.discard_staged(staged).await;
                }
                return Err(err);
            }
        };
        let Some(staged) = staged else {
            return Err(RegistryError::InvalidRequest("datafile is required".into()));
        };

        let recipe_id = Uuid::new_v4();
        let final_path = self
            .recipes_root()
            .join(recipe_id.to_string())
            .join(&staged.filename);
        let placed = async {
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&staged.tmp_path, &final_path).await
        }
        .await;
        if let Err(err) = placed {
            self.discard_staged(staged).await;
            return Err(RegistryError::Io(err));
        }

        let datafile = final_path.to_string_lossy().into_owned();
        match self
            .persist_recipe(
                recipe_id,
                &collection,
                &name,
                &tag,
                Some(owner.id),
                Some((datafile.clone(), staged.checksum.clone())),
            )
            .await
        {
            Ok(recipe) => {
                info!(
                    "{} pushed {}/{}:{} ({} bytes)",
                    owner.username, collection.name, name, tag, staged.size_bytes
                );
                Ok(recipe)
            }
            Err(err) => {
                if let Err(io_err) = self.remove_recipe_file(&datafile).await {
                    warn!("failed to remove rejected datafile {}: {}", datafile, io_err);
                }
                Err(err)
            }
        }
    }

    async fn check_push(
        &self,
        request: &PushRequest,
        has_datafile: bool,
    ) -> RegistryResult<(User, Collection, String, String)> {
        let Some(auth) = request.authorization.as_deref() else {
            return Err(RegistryError::AuthenticationRequired);
        };

        let collection_name = required_field(request.collection.as_deref(), "collection")?;
        let name = required_field(request.name.as_deref(), "name")?;
        let tag = match request.tag.as_deref().map(str::trim) {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => DEFAULT_TAG.to_string(),
        };
        ensure_name_safe(&name, "name")?;
        ensure_name_safe(&tag, "tag")?;
        if !has_datafile {
            return Err(RegistryError::InvalidRequest("datafile is required".into()));
        }

        let Some(owner) = self.resolve_principal(auth).await? else {
            return Err(unauthorized("Unauthorized"));
        };

        let timestamp = match AuthHeader::parse(auth) {
            Ok(AuthHeader::Signed(cred)) => cred.timestamp,
            _ => return Err(unauthorized("Unauthorized")),
        };
        let payload = signature::push_payload(&collection_name, timestamp, &name, &tag);
        if !self
            .validate_request(auth, &payload, BUILD_PURPOSE, timestamp)
            .await?
        {
            info!("rejected push signature from {}", owner.username);
            return Err(unauthorized("Unauthorized"));
        }

        if !owner.has_create_permission() {
            return Err(unauthorized("Unauthorized Create Permission"));
        }

        let Some(collection) = self.find_collection_by_name(&collection_name).await? else {
            return Err(RegistryError::NotFound(format!(
                "collection `{}`",
                collection_name
            )));
        };

        if !self.is_owner(collection.id, owner.id).await? {
            return Err(unauthorized("Unauthorized"));
        }

        if !self.has_permission(auth, &collection, true).await? {
            return Err(unauthorized("Unauthorized"));
        }

        self.ensure_not_frozen(&collection, &name, &tag).await?;
        Ok((owner, collection, name, tag))
    }

    /// The freeze gate: pushes to a frozen `(collection, name, tag)` fail.
    pub(crate) async fn ensure_not_frozen(
        &self,
        collection: &Collection,
        name: &str,
        tag: &str,
    ) -> RegistryResult<()> {
        match self.find_container(collection.id, name, tag).await? {
            Some(container) if container.frozen => Err(RegistryError::Forbidden(format!(
                "{} is frozen, push not allowed.",
                container.short_uri(&collection.name)
            ))),
            _ => Ok(()),
        }
    }

    /// Insert the RecipeFile and mark its container pending.
    ///
    /// Both writes share a transaction; if the container turned frozen in the
    /// meantime the recipe is rolled back and `Forbidden` is returned.
    pub(crate) async fn persist_recipe(
        &self,
        recipe_id: Uuid,
        collection: &Collection,
        name: &str,
        tag: &str,
        owner_id: Option<Uuid>,
        datafile: Option<(String, String)>,
    ) -> RegistryResult<RecipeFile> {
        let (datafile, checksum) = match datafile {
            Some((path, sum)) => (Some(path), Some(sum)),
            None => (None, None),
        };
        let recipe = RecipeFile {
            id: recipe_id,
            datafile,
            checksum,
            collection: collection.name.clone(),
            name: name.to_string(),
            tag: tag.to_string(),
            owner_id,
            created: Utc::now(),
        };

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO recipe_files (id, datafile, checksum, collection, name, tag, owner_id, created)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(recipe.id)
        .bind(&recipe.datafile)
        .bind(&recipe.checksum)
        .bind(&recipe.collection)
        .bind(&recipe.name)
        .bind(&recipe.tag)
        .bind(recipe.owner_id)
        .bind(recipe.created)
        .execute(&mut *tx)
        .await?;
        let container = self
            .upsert_pending_container(&mut tx, collection, name, tag, owner_id)
            .await?;
        tx.commit().await?;

        debug!("container {} pending for recipe {}", container.id, recipe.id);
        Ok(recipe)
    }

    pub async fn list_recipes(
        &self,
        collection: &str,
        name: &str,
        tag: &str,
    ) -> RegistryResult<Vec<RecipeFile>> {
        let recipes = sqlx::query_as::<_, RecipeFile>(
            "SELECT id, datafile, checksum, collection, name, tag, owner_id, created
             FROM recipe_files WHERE collection = ? AND name = ? AND tag = ?
             ORDER BY created",
        )
        .bind(collection)
        .bind(name)
        .bind(tag)
        .fetch_all(&*self.db)
        .await?;
        Ok(recipes)
    }
}

fn unauthorized(reason: &str) -> RegistryError {
    RegistryError::Unauthorized(reason.to_string())
}

fn required_field(value: Option<&str>, field: &str) -> RegistryResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(RegistryError::InvalidRequest(format!("{} is required", field))),
    }
}

/// Container names and tags become path and URI segments.
fn ensure_name_safe(value: &str, field: &str) -> RegistryResult<()> {
    let ok = value.len() <= MAX_NAME_LEN
        && !value.starts_with(['.', '-'])
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidRequest(format!(
            "{} `{}` contains unsupported characters",
            field, value
        )))
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if base.is_empty()
        || base == "."
        || base == ".."
        || base.bytes().any(|b| b.is_ascii_control())
    {
        DEFAULT_RECIPE_NAME.to_string()
    } else {
        base.to_string()
    }
}
