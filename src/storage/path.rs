//! Backend key layout.
//!
//! The mapping from `(space_id, resource_id)` to a key is the only place
//! path shapes are decided. Nothing else is encoded in the key: names and
//! types live in the catalog, which keeps renames metadata-only and lets a
//! workspace purge be a single prefix removal.

/// Extension carried by every stored body.
pub const RESOURCE_EXT: &str = "jar";

/// Key of a resource body: `/{space_id}/{resource_id}.jar`.
pub fn resource_path(space_id: &str, resource_id: &str) -> String {
    format!("/{}/{}.{}", space_id, resource_id, RESOURCE_EXT)
}

/// Prefix owning every body in a workspace: `/{space_id}/`.
pub fn workspace_dir(space_id: &str) -> String {
    format!("/{}/", space_id)
}

/// Scratch key used while re-uploading: `/{space_id}/{epoch_seconds}.jar`.
/// Renamed over the live key on success, removed on failure.
pub fn temp_path(space_id: &str, epoch_seconds: i64) -> String {
    format!("/{}/{}.{}", space_id, epoch_seconds, RESOURCE_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_path_layout() {
        assert_eq!(
            resource_path("wks-A", "res-0001"),
            "/wks-A/res-0001.jar"
        );
    }

    #[test]
    fn workspace_dir_is_a_prefix_of_its_resources() {
        let dir = workspace_dir("wks-A");
        assert_eq!(dir, "/wks-A/");
        assert!(resource_path("wks-A", "res-0001").starts_with(&dir));
        assert!(temp_path("wks-A", 1700000000).starts_with(&dir));
    }
}
