// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Production [`DistributedFs`] backed by `opendal`.
//!
//! `opendal::Operator` already supports the fs/S3/GCS/azblob/webhdfs
//! backends the source system's "distributed filesystem" could mean, so the
//! adapter itself stays backend-agnostic.

use std::path::Path;

use async_trait::async_trait;
use opendal::{ErrorKind, Operator};

use crate::{
    collaborators::DistributedFs,
    error::{FilesystemTransientSnafu, Result},
};

pub struct OpendalFs {
    operator: Operator,
}

impl OpendalFs {
    #[must_use]
    pub fn new(operator: Operator) -> Self { Self { operator } }
}

fn path_str(path: &Path) -> String { path.to_string_lossy().into_owned() }

#[async_trait]
impl DistributedFs for OpendalFs {
    async fn mkdirs(&self, path: &Path) -> Result<()> {
        let mut dir = path_str(path);
        if !dir.ends_with('/') {
            dir.push('/');
        }
        match self.operator.create_dir(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => FilesystemTransientSnafu {
                message: err.to_string(),
            }
            .fail(),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.operator
            .rename(&path_str(from), &path_str(to))
            .await
            .map_err(|err| {
                FilesystemTransientSnafu {
                    message: err.to_string(),
                }
                .build()
            })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.operator.exists(&path_str(path)).await.map_err(|err| {
            FilesystemTransientSnafu {
                message: err.to_string(),
            }
            .build()
        })
    }
}
