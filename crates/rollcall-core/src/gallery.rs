//! Enrolled gallery: one embedding (or none) per roster identity.

use crate::roster::{MemberList, Roster, RosterError};
use crate::types::Embedding;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why an identity ended up without a usable enrollment embedding.
#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("enrollment file not found: {0}")]
    Missing(PathBuf),
    #[error("no face found in enrollment {0}")]
    NoFace(PathBuf),
    #[error("malformed enrollment {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read enrollment {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An enrolled person. `embedding` is `None` when enrollment failed; such
/// identities stay listed but can never be matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub embedding: Option<Embedding>,
}

impl Identity {
    pub fn is_matchable(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Source of enrollment embeddings, one per identity name.
pub trait EnrollmentSource {
    fn embedding_for(&self, name: &str) -> Result<Embedding, EnrollmentError>;
}

/// Enrollment store on disk: `<dir>/<name>.json` holding the JSON array of
/// embeddings the extractor found in that identity's photo. The first one is used.
pub struct EnrollmentDir {
    dir: PathBuf,
}

impl EnrollmentDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl EnrollmentSource for EnrollmentDir {
    fn embedding_for(&self, name: &str) -> Result<Embedding, EnrollmentError> {
        let path = self.path_for(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnrollmentError::Missing(path));
            }
            Err(source) => return Err(EnrollmentError::Io { path, source }),
        };

        let faces: Vec<Embedding> = serde_json::from_str(&text)
            .map_err(|source| EnrollmentError::Malformed { path: path.clone(), source })?;

        faces
            .into_iter()
            .find(|e| !e.values.is_empty())
            .ok_or(EnrollmentError::NoFace(path))
    }
}

/// Ordered, read-only set of enrolled identities.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Build the gallery in roster order. Enrollment problems are logged and
    /// leave that identity unmatchable; they never abort the build.
    pub fn build(names: &[String], source: &dyn EnrollmentSource) -> Self {
        let identities = names
            .iter()
            .map(|name| {
                let embedding = match source.embedding_for(name) {
                    Ok(embedding) => Some(embedding),
                    Err(err) => {
                        tracing::warn!(identity = %name, error = %err, "enrollment missing; identity is unmatchable");
                        None
                    }
                };
                Identity {
                    name: name.clone(),
                    embedding,
                }
            })
            .collect::<Vec<_>>();

        let gallery = Self { identities };
        tracing::info!(
            identities = gallery.len(),
            matchable = gallery.matchable_count(),
            "gallery built"
        );
        gallery
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn matchable_count(&self) -> usize {
        self.identities.iter().filter(|i| i.is_matchable()).count()
    }
}

/// Startup context shared by the scan loop, the matcher and the record flow.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub gallery: Gallery,
    pub members: MemberList,
}

impl Directory {
    pub fn new(gallery: Gallery, members: MemberList) -> Self {
        Self { gallery, members }
    }

    /// Load the roster and build the gallery from the enrollment directory.
    pub fn load(roster_path: &Path, enroll_dir: &Path) -> Result<Self, RosterError> {
        let roster = Roster::load(roster_path)?;
        let gallery = Gallery::build(&roster.identities, &EnrollmentDir::new(enroll_dir));
        Ok(Self::new(gallery, roster.members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, Vec<f32>>);

    impl EnrollmentSource for MapSource {
        fn embedding_for(&self, name: &str) -> Result<Embedding, EnrollmentError> {
            self.0
                .get(name)
                .map(|v| Embedding::new(v.clone()))
                .ok_or_else(|| EnrollmentError::Missing(PathBuf::from(name)))
        }
    }

    #[test]
    fn test_build_keeps_unenrolled_identities_in_order() {
        let source = MapSource(HashMap::from([("A".to_string(), vec![1.0, 0.0])]));
        let names = vec!["A".to_string(), "B".to_string()];
        let gallery = Gallery::build(&names, &source);

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.matchable_count(), 1);
        assert_eq!(gallery.identities()[0].name, "A");
        assert!(gallery.identities()[0].is_matchable());
        assert_eq!(gallery.identities()[1].name, "B");
        assert!(gallery.get("B").unwrap().embedding.is_none());
    }

    #[test]
    fn test_enrollment_dir_reads_first_face() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Alice.json"),
            r#"[{"values":[0.1,0.2]},{"values":[0.9,0.9]}]"#,
        )
        .unwrap();

        let source = EnrollmentDir::new(dir.path());
        let emb = source.embedding_for("Alice").unwrap();
        assert_eq!(emb.values, vec![0.1, 0.2]);
    }

    #[test]
    fn test_enrollment_dir_error_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Empty.json"), "[]").unwrap();
        std::fs::write(dir.path().join("Broken.json"), "{not json").unwrap();
        let source = EnrollmentDir::new(dir.path());

        assert!(matches!(
            source.embedding_for("Ghost"),
            Err(EnrollmentError::Missing(_))
        ));
        assert!(matches!(
            source.embedding_for("Empty"),
            Err(EnrollmentError::NoFace(_))
        ));
        assert!(matches!(
            source.embedding_for("Broken"),
            Err(EnrollmentError::Malformed { .. })
        ));
    }

    #[test]
    fn test_directory_load() {
        let dir = tempfile::tempdir().unwrap();
        let roster = dir.path().join("info.txt");
        std::fs::write(&roster, "1. Alice\na. Bob\n2. Dave\n").unwrap();
        let faces = dir.path().join("faces");
        std::fs::create_dir(&faces).unwrap();
        std::fs::write(faces.join("Alice.json"), r#"[{"values":[0.0,1.0]}]"#).unwrap();

        let directory = Directory::load(&roster, &faces).unwrap();
        assert_eq!(directory.gallery.len(), 2);
        assert_eq!(directory.gallery.matchable_count(), 1);
        assert_eq!(directory.members.members_of("Alice"), ["Bob"]);
    }
}
