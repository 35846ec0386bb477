use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{CatalogId, Record, RecordId};

const TITLE_WORDS: &[&str] = &[
    "historia", "naturalis", "theologia", "platonica", "elementa", "geometriae", "commentarii",
    "physicam", "anima", "mundi", "sphaera", "orbium", "coelestium", "astronomia", "medicina",
    "chirurgia", "grammatica", "rhetorica", "dialectica", "ethica", "politica", "poetica",
    "metaphysica", "musica", "arithmetica", "philosophia", "occulta", "hermetica", "pimander",
    "asclepius", "mysteriis", "aegyptiorum", "vita", "coelitus", "comparanda", "immortalitate",
    "animorum", "divina", "providentia", "natura", "rerum", "principiis", "generatione",
    "corruptione", "meteorologica", "plantis", "animalibus", "lapidibus", "herbarum", "virtutibus",
    "oratio", "dignitate", "hominis", "concordia", "discordantium", "canonum", "institutiones",
    "iuris", "civilis", "epistolae", "familiares", "sententiarum", "quaestiones", "disputatae",
];

const AUTHORS: &[(&str, &str)] = &[
    ("Ficino", "Marsilio"),
    ("Pico", "Giovanni"),
    ("Agrippa", "Heinrich Cornelius"),
    ("Copernicus", "Nicolaus"),
    ("Regiomontanus", "Johannes"),
    ("Sacrobosco", "Johannes"),
    ("Erasmus", "Desiderius"),
    ("Reuchlin", "Johann"),
    ("Trithemius", "Johannes"),
    ("Paracelsus", "Theophrastus"),
    ("Bruno", "Giordano"),
    ("Cardano", "Girolamo"),
    ("Vesalius", "Andreas"),
    ("Gesner", "Conrad"),
    ("Melanchthon", "Philipp"),
    ("Lipsius", "Justus"),
];

const PLACES: &[&str] = &[
    "Venetiis", "Basileae", "Lugduni", "Parisiis", "Florentiae", "Romae", "Coloniae", "Norimbergae",
];

/// A synthetic single-catalog dataset with its known duplicate pairs.
#[derive(Debug, Clone)]
pub struct GeneratedCatalog {
    pub records: Vec<Record>,
    /// Each generated duplicate paired with its original
    pub true_pairs: Vec<(RecordId, RecordId)>,
}

/// Two synthetic catalogs with their known matches.
#[derive(Debug, Clone)]
pub struct GeneratedCatalogs {
    pub sources: Vec<Record>,
    pub targets: Vec<Record>,
    /// `(source_id, target_id)` of every planted match
    pub true_matches: Vec<(RecordId, RecordId)>,
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn base_record(rng: &mut StdRng, id: String, catalog: &str) -> Record {
    let word_count = rng.random_range(3..=5);
    let mut words: Vec<&str> = Vec::with_capacity(word_count);
    while words.len() < word_count {
        let word = *pick(rng, TITLE_WORDS);
        if !words.contains(&word) {
            words.push(word);
        }
    }
    let mut title = words.join(" ");
    if let Some(first) = title.get_mut(0..1) {
        first.make_ascii_uppercase();
    }

    let mut record = Record::new(id, catalog, title).with_year(rng.random_range(1460..1700));
    if rng.random_bool(0.85) {
        let (surname, forename) = pick(rng, AUTHORS);
        record = record.with_author(format!("{surname}, {forename}"));
    }
    if rng.random_bool(0.6) {
        record = record.with_place(*pick(rng, PLACES));
    }
    record
}

/// A transcription variant of `original`: same work, noisier fields.
fn variant(rng: &mut StdRng, original: &Record, id: String, catalog: &str) -> Record {
    let mut title = original.title.clone();
    match rng.random_range(0..3) {
        // Capitals with Latin V for U
        0 => title = title.to_uppercase().replace('U', "V"),
        // Trailing word dropped
        1 => {
            if let Some((head, _)) = title.rsplit_once(' ') {
                title = head.to_string();
            }
        }
        // Punctuation noise
        _ => title = format!("{title}."),
    }

    let mut record = Record {
        id: RecordId(id),
        title,
        author: original.author.clone(),
        year: original.year.map(|y| y + rng.random_range(0..=1)),
        place: original.place.clone(),
        source_catalog: CatalogId::new(catalog),
    };
    if let Some(author) = &original.author {
        if rng.random_bool(0.3) {
            // Abbreviated forename
            if let Some((surname, forename)) = author.split_once(", ") {
                let initial = forename.chars().next().unwrap_or('X');
                record.author = Some(format!("{surname}, {initial}."));
            }
        }
    }
    if rng.random_bool(0.3) {
        record.place = None;
    }
    record
}

/// Generate `count` records of one catalog; each record is followed by a
/// transcription variant with probability `duplicate_probability`.
pub fn generate_catalog(count: u32, duplicate_probability: f64, seed: u64) -> GeneratedCatalog {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(count as usize);
    let mut true_pairs = Vec::new();

    let mut i = 0;
    while records.len() < count as usize {
        let original = base_record(&mut rng, format!("rec_{i:06}"), "bph");
        i += 1;
        let make_duplicate =
            records.len() + 1 < count as usize && rng.random_bool(duplicate_probability);
        if make_duplicate {
            let duplicate = variant(&mut rng, &original, format!("rec_{i:06}"), "bph");
            i += 1;
            true_pairs.push((original.id.clone(), duplicate.id.clone()));
            records.push(original);
            records.push(duplicate);
        } else {
            records.push(original);
        }
    }

    GeneratedCatalog {
        records,
        true_pairs,
    }
}

/// Generate a source catalog of `count` records and a target catalog that
/// holds a variant of each source with probability `overlap`, plus as many
/// unrelated records.
pub fn generate_catalogs(count: u32, overlap: f64, seed: u64) -> GeneratedCatalogs {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sources = Vec::with_capacity(count as usize);
    let mut targets = Vec::with_capacity(count as usize * 2);
    let mut true_matches = Vec::new();

    for i in 0..count {
        let source = base_record(&mut rng, format!("src_{i:06}"), "bph");
        if rng.random_bool(overlap) {
            let target = variant(&mut rng, &source, format!("tgt_{i:06}"), "ia");
            true_matches.push((source.id.clone(), target.id.clone()));
            targets.push(target);
        }
        targets.push(base_record(&mut rng, format!("noise_{i:06}"), "ia"));
        sources.push(source);
    }

    GeneratedCatalogs {
        sources,
        targets,
        true_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_seeded() {
        let a = generate_catalog(50, 0.3, 7);
        let b = generate_catalog(50, 0.3, 7);
        assert_eq!(a.records, b.records);
        assert_eq!(a.records.len(), 50);
        assert!(!a.true_pairs.is_empty());
    }

    #[test]
    fn test_catalogs_plant_matches() {
        let data = generate_catalogs(40, 0.5, 11);
        assert_eq!(data.sources.len(), 40);
        assert_eq!(data.targets.len(), 40 + data.true_matches.len());
    }
}
