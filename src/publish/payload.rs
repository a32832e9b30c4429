//! Request construction for publishing.

use crate::config::SyncConfig;
use crate::discourse::{CreatePost, RemoteRequest, UpdatePost};
use crate::types::{RemotePostId, SyncedPost, TopicId};

/// Builds the `POST /posts` request that creates the topic for `post`.
pub fn create_request(
    config: &SyncConfig,
    post: &SyncedPost,
    raw: &str,
    embed_url: &str,
    author_username: Option<&str>,
) -> RemoteRequest {
    // With a single shared key the topic is created as the publishing user and
    // handed to the author afterwards.
    let api_username = if config.single_user_api_key_publication {
        None
    } else {
        Some(
            author_username
                .unwrap_or(&config.publish_username)
                .to_string(),
        )
    };

    RemoteRequest::CreatePost(CreatePost {
        embed_url: embed_url.to_string(),
        featured_link: config.add_featured_link.then(|| embed_url.to_string()),
        title: post.title.clone(),
        raw: raw.to_string(),
        category: post.category_id.or(config.default_category),
        skip_validations: true,
        auto_track: config.auto_track,
        visible: !post.unlisted,
        tags: post.tags.clone(),
        api_username,
    })
}

/// Builds the `PUT /posts/{id}` request that replaces title and content.
pub fn update_request(post_id: RemotePostId, title: &str, raw: &str) -> RemoteRequest {
    RemoteRequest::UpdatePost {
        post_id,
        payload: UpdatePost::new(title, raw),
    }
}

/// The author a created topic should be handed to, if any.
pub fn owner_change_target<'a>(
    config: &SyncConfig,
    author_username: Option<&'a str>,
) -> Option<&'a str> {
    if !config.single_user_api_key_publication {
        return None;
    }
    author_username.filter(|author| !author.is_empty() && *author != config.publish_username)
}

/// Public URL of a topic.
pub fn permalink(base_url: &str, topic_slug: &str, topic_id: TopicId) -> String {
    format!("{base_url}/t/{topic_slug}/{topic_id}")
}
