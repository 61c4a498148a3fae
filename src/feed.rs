//! Researcher social feed

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::auth::SessionUser;
use crate::error::{Error, FieldError, Result};
use crate::specimen::Fetched;
use crate::store::{
    decode, decode_all, timestamp_now, DocumentStore, Precondition, Query, SortOrder,
};

/// Attempts at a like toggle before giving up on concurrent writers
const LIKE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    /// Assigned by the store
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub author_id: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub author_name: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Specimen the post is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen_id: Option<String>,
    /// Ids of users who liked the post
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub likes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Post {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

/// Draft of a new post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPost {
    pub content: String,
    pub image_url: Option<String>,
    pub specimen_id: Option<String>,
}

impl NewPost {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }
}

pub struct Feed<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> Clone for Feed<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized> Feed<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            collection: "posts".to_string(),
        }
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    pub async fn create_post(&self, author: &SessionUser, draft: NewPost) -> Result<Post> {
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(Error::Validation(vec![FieldError::new(
                "content",
                "Post cannot be empty",
            )]));
        }

        let now = timestamp_now();
        let post = Post {
            id: String::new(),
            author_id: author.id.clone(),
            author_name: author.display_name(),
            content: content.to_string(),
            image_url: draft.image_url,
            specimen_id: draft.specimen_id,
            likes: Vec::new(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        let stored = self
            .store
            .insert(&self.collection, serde_json::to_value(&post)?)
            .await
            .map_err(|e| {
                log::error!("Failed to create post: {}", e);
                e
            })?;
        decode(stored)
    }

    /// Newest posts first
    pub async fn recent_posts(&self, limit: usize) -> Fetched<Vec<Post>> {
        let query = Query::new()
            .order("createdAt", SortOrder::Descending)
            .limit(limit);
        match self
            .store
            .query(&self.collection, &query)
            .await
            .and_then(decode_all::<Post>)
        {
            Ok(posts) => Fetched::ok(posts),
            Err(e) => {
                log::error!("Failed to load posts: {}", e);
                Fetched::failed(e)
            }
        }
    }

    /// Like or unlike; returns whether `user_id` now likes the post
    pub async fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<bool> {
        for _ in 0..LIKE_ATTEMPTS {
            let post: Post = match self.store.fetch(&self.collection, post_id).await? {
                Some(document) => decode(document)?,
                None => return Err(Error::not_found(format!("post {}", post_id))),
            };

            let liked = !post.is_liked_by(user_id);
            let mut likes = post.likes.clone();
            if liked {
                likes.push(user_id.to_string());
            } else {
                likes.retain(|id| id != user_id);
            }
            let guard = post
                .updated_at
                .as_ref()
                .map(|stamp| Precondition::new("updatedAt", stamp));
            let patch = json!({ "likes": likes, "updatedAt": timestamp_now() });

            if self
                .store
                .update(&self.collection, post_id, patch, guard.as_ref())
                .await?
                .is_some()
            {
                return Ok(liked);
            }
            log::debug!("Post {} changed while toggling like, retrying", post_id);
        }
        Err(Error::conflict(format!("post {} is being edited", post_id)))
    }

    /// Authors may remove their own posts; admins may remove any
    pub async fn delete_post(&self, actor: &SessionUser, post_id: &str) -> Result<()> {
        let post: Post = match self.store.fetch(&self.collection, post_id).await? {
            Some(document) => decode(document)?,
            None => return Err(Error::not_found(format!("post {}", post_id))),
        };
        if post.author_id != actor.id && !actor.is_admin() {
            return Err(Error::forbidden("only the author can delete this post"));
        }
        if !self.store.delete(&self.collection, post_id).await? {
            return Err(Error::not_found(format!("post {}", post_id)));
        }
        log::info!("{} deleted post {}", actor.email, post_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::users::{AccountStatus, Role};

    fn user(id: &str, role: Role) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            email: format!("{}@uni.edu", id),
            role,
            status: AccountStatus::Active,
            first_name: "Ana".to_string(),
            last_name: "Lima".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first() {
        let feed = Feed::new(Arc::new(MemoryStore::new()));
        let ana = user("u-1", Role::Researcher);
        feed.create_post(&ana, NewPost::text("First collection trip"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = feed
            .create_post(&ana, NewPost::text("  Found a bee orchid  "))
            .await
            .unwrap();

        assert_eq!(second.content, "Found a bee orchid");
        assert_eq!(second.author_name, "Ana Lima");

        let posts = feed.recent_posts(10).await;
        assert!(posts.is_ok());
        assert_eq!(posts.value.len(), 2);
        assert_eq!(posts.value[0].id, second.id);
        assert_eq!(feed.recent_posts(1).await.value.len(), 1);
    }

    #[test]
    fn post_with_null_columns_decodes() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "id": "p-1",
            "authorId": "u-1",
            "authorName": null,
            "content": "Lichen walk",
            "imageUrl": null,
            "likes": null
        }))
        .unwrap();
        assert!(post.author_name.is_empty());
        assert!(post.likes.is_empty());
        assert_eq!(post.image_url, None);
    }

    #[tokio::test]
    async fn empty_post_is_rejected() {
        let feed = Feed::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            feed.create_post(&user("u-1", Role::Guest), NewPost::text("   ")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn like_toggles() {
        let feed = Feed::new(Arc::new(MemoryStore::new()));
        let post = feed
            .create_post(&user("u-1", Role::Researcher), NewPost::text("Moss season"))
            .await
            .unwrap();

        assert!(feed.toggle_like(&post.id, "u-2").await.unwrap());
        assert!(feed.toggle_like(&post.id, "u-3").await.unwrap());
        assert!(!feed.toggle_like(&post.id, "u-2").await.unwrap());

        let posts = feed.recent_posts(1).await.value;
        assert_eq!(posts[0].likes, vec!["u-3"]);
        assert!(matches!(
            feed.toggle_like("missing", "u-2").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_author_or_admin_deletes() {
        let feed = Feed::new(Arc::new(MemoryStore::new()));
        let post = feed
            .create_post(&user("u-1", Role::Researcher), NewPost::text("Herbarium open day"))
            .await
            .unwrap();

        assert!(matches!(
            feed.delete_post(&user("u-2", Role::Researcher), &post.id).await,
            Err(Error::Forbidden(_))
        ));
        feed.delete_post(&user("admin-1", Role::Admin), &post.id)
            .await
            .unwrap();
        assert!(feed.recent_posts(10).await.value.is_empty());
    }
}
