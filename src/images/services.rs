use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::state::AppState;

/// Long enough for a dashboard render, short enough to stay ephemeral.
pub const PRESIGN_TTL_SECS: u64 = 10 * 60;

/// Store one meal photo; the key embeds a fresh id so uploads never collide.
pub async fn upload_image(
    st: &AppState,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4();
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    let key = format!("meals/{}.{}", id, ext);
    st.storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

pub async fn delete_image(st: &AppState, key: &str) -> anyhow::Result<()> {
    st.storage
        .delete_object(key)
        .await
        .with_context(|| format!("delete_object {}", key))
}

pub async fn presign_image(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::state::AppState;

    #[test]
    fn ext_from_mime_covers_common_images() {
        assert_eq!(super::ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/png"), Some("png"));
        assert_eq!(super::ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(super::ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(super::ext_from_mime("application/octet-stream"), None);
        assert_eq!(super::ext_from_mime("whatever/else"), None);
    }

    #[tokio::test]
    async fn upload_builds_a_keyed_object() {
        let state = AppState::fake();
        let key = super::upload_image(&state, bytes::Bytes::from_static(b"img"), "image/png")
            .await
            .unwrap();
        assert!(key.starts_with("meals/"));
        assert!(key.ends_with(".png"));
    }

    #[tokio::test]
    async fn unknown_mime_falls_back_to_bin() {
        let state = AppState::fake();
        let key = super::upload_image(&state, bytes::Bytes::from_static(b"img"), "text/plain")
            .await
            .unwrap();
        assert!(key.ends_with(".bin"));
    }

    #[tokio::test]
    async fn presign_embeds_the_key() {
        let state = AppState::fake();
        let url = super::presign_image(&state, "meals/a-b-c.jpg").await.unwrap();
        assert!(url.contains("meals/a-b-c.jpg"));
    }
}
