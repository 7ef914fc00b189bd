use std::path::Path;

use tempfile::NamedTempFile;

pub fn atomic_write(target: &Path, content: &str) -> std::io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    std::fs::write(temp.path(), content)?;
    temp.persist(target)?;
    Ok(())
}

pub async fn atomic_write_async(target: &Path, content: &str) -> std::io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no parent")
    })?;
    tokio::fs::create_dir_all(parent).await?;

    let temp = NamedTempFile::new_in(parent)?;
    tokio::fs::write(temp.path(), content).await?;
    temp.persist(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_file() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("session.json");

        atomic_write(&target, r#"{"key": "value"}"#).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("nested").join("dir").join("session.json");

        atomic_write(&target, "content").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "content");
    }

    #[test]
    fn atomic_write_overwrites_existing() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("session.json");
        fs::write(&target, "old").unwrap();

        atomic_write(&target, "new").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[tokio::test]
    async fn atomic_write_async_creates_file() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("async_session.json");

        atomic_write_async(&target, r#"{"async": true}"#)
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), r#"{"async": true}"#);
    }
}
