use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use diesel::{pg::Pg, prelude::*};
use diesel_async::{
    AsyncPgConnection, RunQueryDsl,
    pooled_connection::{
        AsyncDieselConnectionManager,
        deadpool::{Object, Pool},
    },
};

use crate::{
    models::{
        comment::{Comment, ModerateComment, NewComment},
        comment_options::{CommentOptions, NewCommentOptions},
        content_type::ContentType,
        publishable::Publishable,
    },
    schema::{comment_options, comments, content_types, publishables},
    target::{ContentTypeTag, Target, TargetLoader},
};

use super::{CommentFilter, CommentStore, StoreError};

pub type DieselPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: DieselPool,
}

impl PgStore {
    pub fn connect(database_url: &str, max_size: usize) -> Result<Self, StoreError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(deadpool_runtime::Runtime::Tokio1)
            .wait_timeout(Some(Duration::from_secs(10)))
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(PgStore { pool })
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        get_conn(&self.pool).await
    }
}

async fn get_conn(pool: &DieselPool) -> Result<Object<AsyncPgConnection>, StoreError> {
    pool.get().await.map_err(|e| {
        tracing::error!(error = %e, "could not get diesel pool conn");
        StoreError::Pool(e.to_string())
    })
}

struct PgPublishableLoader {
    pool: DieselPool,
    content_type: ContentTypeTag,
}

#[async_trait]
impl TargetLoader for PgPublishableLoader {
    async fn load(&self, object_id: i32) -> Result<Option<Target>, StoreError> {
        let mut conn = get_conn(&self.pool).await?;

        let row = publishables::table
            .inner_join(content_types::table)
            .filter(publishables::id.eq(object_id))
            .filter(content_types::app_label.eq(&self.content_type.app_label))
            .filter(content_types::model.eq(&self.content_type.model))
            .select((Publishable::as_select(), ContentType::as_select()))
            .first::<(Publishable, ContentType)>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(|(publishable, content_type)| Target {
            content_type: self.content_type.clone(),
            content_type_id: content_type.id,
            object_id: publishable.id,
            title: publishable.title,
            slug: publishable.slug,
        }))
    }
}

fn filtered_comments(filter: &CommentFilter) -> comments::BoxedQuery<'static, Pg> {
    let mut query = comments::table.into_boxed();
    if let Some(ct) = filter.content_type_id {
        query = query.filter(comments::content_type_id.eq(ct));
    }
    if let Some(id) = filter.object_id {
        query = query.filter(comments::object_id.eq(id));
    }
    if let Some(is_public) = filter.is_public {
        query = query.filter(comments::is_public.eq(is_public));
    }
    if let Some(is_removed) = filter.is_removed {
        query = query.filter(comments::is_removed.eq(is_removed));
    }
    query
}

#[async_trait]
impl CommentStore for PgStore {
    fn publishable_loader(&self, content_type: &ContentTypeTag) -> Arc<dyn TargetLoader> {
        Arc::new(PgPublishableLoader {
            pool: self.pool.clone(),
            content_type: content_type.clone(),
        })
    }

    async fn comment_options(&self, target: &Target) -> Result<Option<CommentOptions>, StoreError> {
        let mut conn = self.conn().await?;

        Ok(comment_options::table
            .filter(comment_options::target_ct_id.eq(target.content_type_id))
            .filter(comment_options::target_id.eq(target.object_id))
            .select(CommentOptions::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn upsert_comment_options(
        &self,
        target: &Target,
        blocked: bool,
    ) -> Result<CommentOptions, StoreError> {
        let mut conn = self.conn().await?;

        Ok(diesel::insert_into(comment_options::table)
            .values(&NewCommentOptions {
                target_ct_id: target.content_type_id,
                target_id: target.object_id,
                blocked,
            })
            .on_conflict((comment_options::target_ct_id, comment_options::target_id))
            .do_update()
            .set(comment_options::blocked.eq(blocked))
            .returning(CommentOptions::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn visible_comments(&self, target: &Target) -> Result<Vec<Comment>, StoreError> {
        let mut conn = self.conn().await?;

        Ok(comments::table
            .filter(comments::content_type_id.eq(target.content_type_id))
            .filter(comments::object_id.eq(target.object_id))
            .filter(comments::is_public.eq(true))
            .filter(comments::is_removed.eq(false))
            .order((comments::submit_date.asc(), comments::id.asc()))
            .select(Comment::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn get_comment(&self, id: i32) -> Result<Option<Comment>, StoreError> {
        let mut conn = self.conn().await?;

        Ok(comments::table
            .find(id)
            .select(Comment::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut conn = self.conn().await?;

        Ok(diesel::insert_into(comments::table)
            .values(&comment)
            .returning(Comment::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        Ok(filtered_comments(filter)
            .count()
            .get_result(&mut conn)
            .await?)
    }

    async fn list_comments(
        &self,
        filter: &CommentFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let mut conn = self.conn().await?;

        Ok(filtered_comments(filter)
            .order((comments::submit_date.desc(), comments::id.desc()))
            .offset(offset)
            .limit(limit)
            .select(Comment::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn moderate_comment(
        &self,
        id: i32,
        changes: &ModerateComment,
    ) -> Result<Option<Comment>, StoreError> {
        let mut conn = self.conn().await?;

        Ok(diesel::update(comments::table.find(id))
            .set(changes)
            .returning(Comment::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?)
    }
}
