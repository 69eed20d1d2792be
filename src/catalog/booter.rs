//! The `.bt` boot file: an 8-byte record holding the UID of the first
//! table in the catalog's linked list (spec.md §6, grounded on
//! `original_source/backend/tbm/Booter.go`). Updates go through a
//! `.bt_tmp` sibling file, fsynced and then renamed over the live file,
//! so a crash mid-write never leaves a torn boot record.

use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const BOOTER_SUFFIX: &str = "bt";
const BOOTER_TMP_SUFFIX: &str = "bt_tmp";

pub struct Booter {
    path: PathBuf,
}

impl Booter {
    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension(BOOTER_TMP_SUFFIX)
    }

    fn live_path(&self) -> PathBuf {
        self.path.with_extension(BOOTER_SUFFIX)
    }

    fn remove_stale_tmp(path_prefix: &Path) -> RsqlResult<()> {
        let tmp = path_prefix.with_extension(BOOTER_TMP_SUFFIX);
        if tmp.exists() {
            fs::remove_file(tmp)?;
        }
        Ok(())
    }

    pub fn create<P: AsRef<Path>>(path_prefix: P, initial: &[u8]) -> RsqlResult<Booter> {
        let path = path_prefix.as_ref().to_path_buf();
        Self::remove_stale_tmp(&path)?;
        let booter = Booter { path };
        if booter.live_path().exists() {
            return Err(RsqlError::FileExists);
        }
        fs::write(booter.live_path(), initial)?;
        Ok(booter)
    }

    pub fn open<P: AsRef<Path>>(path_prefix: P) -> RsqlResult<Booter> {
        let path = path_prefix.as_ref().to_path_buf();
        Self::remove_stale_tmp(&path)?;
        let booter = Booter { path };
        if !booter.live_path().exists() {
            return Err(RsqlError::Other(format!("boot file missing: {}", booter.live_path().display())));
        }
        Ok(booter)
    }

    pub fn load(&self) -> RsqlResult<Vec<u8>> {
        Ok(fs::read(self.live_path())?)
    }

    /// Writes `data` to `.bt_tmp`, fsyncs it, then atomically renames it
    /// over `.bt` (Booter.go's `Update`).
    pub fn update(&self, data: &[u8]) -> RsqlResult<()> {
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.live_path())?;
        Ok(())
    }
}
