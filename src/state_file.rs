//! JSON state files.
//!
//! Both the [store][crate::store] and the [local provider][crate::provider::local] keep their
//! state in memory and can mirror it to a JSON file on disk after each change, reloading it
//! across restarts.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

/// A JSON file holding a serialized `T`.
#[derive(Debug, Clone)]
pub struct StateFile<T> {
    path: PathBuf,
    _state: PhantomData<fn() -> T>,
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Open the state file at the given path, returning it together with the state it holds.
    ///
    /// A missing file is created holding `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the path can't be opened, read or created, and an
    /// [`ErrorKind::InvalidData`] IO error if the file content isn't valid JSON for `T`.
    pub async fn open(p: impl AsRef<Path>) -> io::Result<(Self, T)> {
        let path = p.as_ref().to_path_buf();
        let contents = match File::open(&path).await {
            Ok(mut f) => {
                let mut buf = vec![];
                f.read_to_end(&mut buf).await?;
                buf
            }
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Self::write_empty_state(File::create(&path).await?).await?,
                _ => return Err(err),
            },
        };

        let state: T = serde_json::from_slice(&contents)?;
        Ok((
            Self {
                path,
                _state: PhantomData,
            },
            state,
        ))
    }

    /// Replace the file content with the given state.
    ///
    /// The state is written to a sibling temporary file which is then renamed over the target, so
    /// a failed save never leaves a truncated file behind.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the state can't be serialized or written.
    pub async fn save(&self, state: &T) -> io::Result<()> {
        let data = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("tmp");
        let mut output_file = File::create(&tmp_path).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        output_file.sync_all().await?;
        tokio::fs::rename(&tmp_path, &self.path).await
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_empty_state(mut f: File) -> io::Result<Vec<u8>> {
        let default_data = serde_json::to_string_pretty(&T::default())?;
        let default_bytes = default_data.as_bytes();
        f.write_all(default_bytes).await?;
        f.flush().await?;
        Ok(default_bytes.to_vec())
    }
}
