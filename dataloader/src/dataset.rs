use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use rand::{Rng, seq::SliceRandom};

use crate::{LoaderErr, Result};

/// The column holding the image path.
const PATH_COLUMN: usize = 1;
/// The first of the `2 * joints` label columns.
const LABEL_COLUMN: usize = 3;

/// A single supervised sample: an image on disk and its joint coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: Vec<f32>,
}

/// An immutable list of samples, all of them labeled with the same amount of joints.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
    joints: usize,
}

impl Dataset {
    /// Reads a dataset list file.
    ///
    /// Every row is comma separated, without a header: the second column is the image path,
    /// relative to `root`, and the `2 * joints` columns starting at the fourth one are the
    /// coordinates `x0, y0, x1, y1, ...`. Any other column is ignored.
    ///
    /// # Errors
    /// If the file can't be read, or a row is too short or has a label that isn't a number.
    pub fn load(list: &Path, root: &Path, joints: usize) -> Result<Self> {
        let samples = read_rows(list, |line, record| {
            let path = root.join(column(&record, line, PATH_COLUMN)?);
            let label = (LABEL_COLUMN..LABEL_COLUMN + 2 * joints)
                .map(|i| {
                    let raw = column(&record, line, i)?;
                    raw.parse::<f32>().map_err(|e| LoaderErr::Row {
                        line,
                        detail: format!("column {} holds {raw:?}: {e}", i + 1),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Sample { path, label })
        })?;

        debug!(list:? = list, samples = samples.len(); "dataset loaded");
        Self::from_samples(samples, joints)
    }

    /// Creates a dataset from samples already in memory.
    ///
    /// # Errors
    /// If any label doesn't hold `2 * joints` coordinates.
    pub fn from_samples(samples: Vec<Sample>, joints: usize) -> Result<Self> {
        if let Some(bad) = samples.iter().find(|s| s.label.len() != 2 * joints) {
            return Err(LoaderErr::Config(format!(
                "{} has {} coordinates, expected {}",
                bad.path.display(),
                bad.label.len(),
                2 * joints
            )));
        }

        Ok(Self { samples, joints })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn joints(&self) -> usize {
        self.joints
    }

    /// Returns the sample at `idx` (panics if out of bounds).
    #[inline]
    pub fn get(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Reads only the image paths of a dataset list file, resolved against `root`.
pub fn read_paths(list: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    read_rows(list, |line, record| {
        Ok(root.join(column(&record, line, PATH_COLUMN)?))
    })
}

/// Returns a uniformly random permutation of `0..len`.
pub fn permutation<R: Rng>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..len).collect();
    perm.shuffle(rng);
    perm
}

fn read_rows<T, F>(list: &Path, mut parse: F) -> Result<Vec<T>>
where
    F: FnMut(u64, StringRecord) -> Result<T>,
{
    let csv_err = |source| LoaderErr::Csv {
        path: list.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(list)
        .map_err(csv_err)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map_or(i as u64 + 1, |p| p.line());
        rows.push(parse(line, record)?);
    }

    Ok(rows)
}

fn column<'r>(record: &'r StringRecord, line: u64, i: usize) -> Result<&'r str> {
    record.get(i).ok_or_else(|| LoaderErr::Row {
        line,
        detail: format!("expected at least {} columns, got {}", i + 1, record.len()),
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn list(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn permutation_holds_every_index_once() {
        let mut rng = StdRng::seed_from_u64(5);
        for len in [0, 1, 7, 100] {
            let mut perm = permutation(len, &mut rng);
            perm.sort_unstable();
            assert_eq!(perm, (0..len).collect::<Vec<_>>());
        }
    }

    #[test]
    fn rows_map_to_paths_and_labels() {
        let file = list("0,a.png,x,0.1,0.2,0.3,0.4,extra\n1, b.png ,x,1,2,3,4\n");
        let dataset = Dataset::load(file.path(), Path::new("/imgs"), 2).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).path, PathBuf::from("/imgs/a.png"));
        assert_eq!(dataset.get(0).label, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(dataset.get(1).path, PathBuf::from("/imgs/b.png"));
        assert_eq!(dataset.get(1).label, [1., 2., 3., 4.]);
    }

    #[test]
    fn short_rows_name_their_line() {
        let file = list("0,a.png,x,0.1,0.2\n0,b.png,x,0.1\n");
        let err = Dataset::load(file.path(), Path::new(""), 1).unwrap_err();
        assert!(matches!(err, LoaderErr::Row { line: 2, .. }), "{err}");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let file = list("0,a.png,x,0.1,nope\n");
        let err = Dataset::load(file.path(), Path::new(""), 1).unwrap_err();
        assert!(matches!(err, LoaderErr::Row { line: 1, .. }), "{err}");
    }

    #[test]
    fn paths_only_need_two_columns() {
        let file = list("0,a.png\n1,b.png,x,0.5\n");
        let paths = read_paths(file.path(), Path::new("root")).unwrap();
        assert_eq!(paths, [PathBuf::from("root/a.png"), PathBuf::from("root/b.png")]);
    }

    #[test]
    fn missing_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        assert!(!fs::exists(&missing).unwrap());
        assert!(matches!(
            Dataset::load(&missing, dir.path(), 1),
            Err(LoaderErr::Csv { .. })
        ));
    }
}
