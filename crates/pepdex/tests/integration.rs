//! Digestion invariants, and agreement between the on-disk index and direct
//! digestion of the same proteins

use pepdex_core::constraint::{Builder, PeptideConstraint};
use pepdex_core::database::Database;
use pepdex_core::enzyme::{Digestion, Enzyme};
use pepdex_core::generator::CandidateGenerator;
use pepdex_core::index::{self, Index};
use pepdex_core::peptide::Peptide;
use quickcheck_macros::quickcheck;
use std::sync::{Arc, OnceLock};

const FASTA: &'static str = r#"
>sp|Q99536|VAT1_HUMAN Synaptic vesicle membrane protein VAT-1 homolog OS=Homo sapiens OX=9606 GN=VAT1 PE=1 SV=2
MSDEREVAEAATGEDASSPPPKTEAASDPQHPAASEGAAAAAASPPLLRCLVLTGFGGYD
KVKLQSRPAAPPAPGPGQLTLRLRACGLNFADLMARQGLYDRLPPLPVTPGMEGAGVVIA
VGEGVSDRKAGDRVMVLNRSGMWQEEVTVPSVQTFLIPEAMTFEEAAALLVNYITAYMVL
FDFGNLQPGHSVLVHMAAGGVGMAAVQLCRTVENVTVFGTASASKHEALKENGVTHPIDY
HTTDYVDEIKKISPKGVDIVMDPLGGSDTAKGYNLLKPMGKVVTYGMANLLTGPKRNLMA
LARTWWNQFSVTALQLLQANRAVCGFHLGYLDGEVELVSGVVARLLALYNQGHIKPHIDS
VWPFEKVADAMKQMQEKKNVGKVLLVPGPEKEN
>check-protein
MRVLKFGGTSVANAERFLRVADILESNARQGQVAOOTVLSAPAKITNHLVAMIEKTISGQDALPNISDAERIFAELLTGLAAAQPGFPLAQLKTFWVDQEFAQIKHVLHGISLWLGQC
>short
PEPTIDEKAAVANAERGGK
"#;

const DIGESTIONS: [Digestion; 3] = [Digestion::Full, Digestion::Partial, Digestion::NonSpecific];
const ENZYMES: [Enzyme; 4] = [Enzyme::Trypsin, Enzyme::Chymotrypsin, Enzyme::AspN, Enzyme::GluC];

fn database() -> Arc<Database> {
    Database::parse(FASTA).unwrap()
}

fn index_constraint() -> PeptideConstraint {
    Builder {
        digestion: Some(Digestion::Partial),
        min_mass: Some(300.0),
        max_mass: Some(3000.0),
        min_length: Some(3),
        max_length: Some(25),
        missed_cleavages: Some(2),
        ..Default::default()
    }
    .make_parameters()
    .unwrap()
}

/// Built once and shared by every test in this file
fn index() -> &'static Index {
    static INDEX: OnceLock<(tempfile::TempDir, Index)> = OnceLock::new();
    let (_, index) = INDEX.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("proteins.fasta");
        std::fs::write(&fasta, FASTA).unwrap();
        let settings = index::Builder {
            bucket_width: Some(50.0),
            batch_size: Some(64),
            retry_delay_ms: Some(1),
            ..Default::default()
        }
        .make_parameters()
        .unwrap();
        let index = Index::create(&fasta, dir.path().join("index"), index_constraint(), settings)
            .unwrap();
        (dir, index)
    });
    index
}

fn sequences<I: IntoIterator<Item = Peptide>>(db: &Database, peptides: I) -> Vec<String> {
    let mut v = peptides
        .into_iter()
        .map(|p| p.sequence(db).unwrap().into_owned())
        .collect::<Vec<_>>();
    v.sort();
    v
}

#[quickcheck]
fn digestion_invariants(
    enzyme: u8,
    digestion: u8,
    min_length: u8,
    span: u8,
    missed: u8,
    low: u16,
) -> bool {
    let db = database();
    let min_length = (min_length % 12) as usize + 1;
    let c = Builder {
        enzyme: Some(ENZYMES[enzyme as usize % ENZYMES.len()]),
        digestion: Some(DIGESTIONS[digestion as usize % DIGESTIONS.len()]),
        min_length: Some(min_length),
        max_length: Some(min_length + (span % 20) as usize),
        missed_cleavages: Some(missed % 3),
        min_mass: Some(low as f64 % 1500.0),
        max_mass: Some(low as f64 % 1500.0 + 1500.0),
        unique_peptides: Some(false),
        ..Default::default()
    }
    .make_parameters()
    .unwrap()
    .shared();

    for protein in db.proteins() {
        let view = db.view(protein).unwrap();
        let residues = view.sequence.as_bytes();
        let legal = |at: usize| {
            at == 0 || at == residues.len() || c.enzyme.is_cleavage(residues[at - 1], residues[at])
        };

        let generator = CandidateGenerator::new(residues, view.ordinal, c.clone()).unwrap();
        for candidate in generator.candidates() {
            if !c.contains_length(candidate.length) || !c.contains_mass(candidate.mass) {
                return false;
            }
            let window = &residues[candidate.start..candidate.end()];
            if c.limits_missed_cleavages()
                && Peptide::missed_cleavages(window, &c.enzyme) > c.missed_cleavages as usize
            {
                return false;
            }
            let (n, term) = (legal(candidate.start), legal(candidate.end()));
            let ok = match c.digestion {
                Digestion::Full => n && term,
                Digestion::Partial => n || term,
                Digestion::NonSpecific => true,
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

#[quickcheck]
fn query_matches_direct_digestion(low: u16, width: u16, digestion: bool, missed: u8) -> bool {
    let index = index();
    let db = index.database();
    let min_mass = 300.0 + (low % 2500) as f64;
    let request = PeptideConstraint {
        min_mass,
        max_mass: (min_mass + (width % 500) as f64).min(3000.0),
        digestion: match digestion {
            true => Digestion::Full,
            false => Digestion::Partial,
        },
        missed_cleavages: missed % 3,
        ..index_constraint()
    };

    let stored = index
        .peptides(&request)
        .unwrap()
        .collect::<pepdex_core::Result<Vec<_>>>()
        .unwrap();
    let direct = db.peptides(&request.clone().shared()).unwrap();
    sequences(db, stored) == sequences(db, direct)
}

#[test]
fn build_query_consistency() {
    let index = index();
    let db = index.database();
    let request = index_constraint();

    let stored = index
        .peptides(&request)
        .unwrap()
        .collect::<pepdex_core::Result<Vec<_>>>()
        .unwrap();
    let direct = db.peptides(&request.clone().shared()).unwrap();
    assert!(!direct.is_empty());

    let total = |p: &[Peptide]| p.iter().map(|p| p.sources().len()).sum::<usize>();
    assert_eq!(total(&stored), total(&direct));
    assert_eq!(sequences(db, stored), sequences(db, direct));
}

#[test]
fn fast_forward_stays_in_one_bucket() {
    let index = index();
    let limit = index.constraint().max_mass;
    for bucket in &index.catalog().buckets {
        let request = PeptideConstraint {
            min_mass: bucket.start + 5.0,
            max_mass: (bucket.end() - 5.0).min(limit),
            ..index_constraint()
        };
        if request.min_mass > request.max_mass {
            continue;
        }
        let mut query = index.query(&request).unwrap();
        for peptide in query.by_ref() {
            let peptide = peptide.unwrap();
            assert!(request.contains_mass(peptide.mass()));
        }
        assert!(query.opened() <= 1);
    }
}

#[test]
fn vadilesnar() {
    let db = database();
    let c = Builder {
        min_length: Some(6),
        max_length: Some(20),
        min_mass: Some(500.0),
        max_mass: Some(1500.0),
        ..Default::default()
    }
    .make_parameters()
    .unwrap()
    .shared();

    let peptides = db.peptides(&c).unwrap();
    let hit = peptides
        .iter()
        .find(|p| p.sequence(&db).unwrap() == "VADILESNAR")
        .unwrap();
    assert!((hit.mass() - 1087.2).abs() < 0.01);

    for p in &peptides {
        let seq = p.sequence(&db).unwrap();
        assert_eq!(Peptide::missed_cleavages(seq.as_bytes(), &Enzyme::Trypsin), 0);
    }
}
