//! Replay a scripted caption feed through the reconciliation engine.
//!
//! ```text
//! cargo run --example replay -- --fixture corrections --dedup
//! ```

use transcript::engine::{ReconcileAction, ReconciliationEngine};
use transcript::matcher::{SimilarityMatcher, Strictness};
use transcript::timeline;
use transcript::timestamp::TimestampTag;
use transcript::types::TranscriptLine;

#[derive(Clone, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
enum Fixture {
    /// A speaker growing one sentence word by word, with interjections.
    GrowingCaption,
    /// In-place ASR corrections and a second speaker interleaved.
    Corrections,
}

impl Fixture {
    /// `(speaker, text, seconds-into-session)` observations, in capture order.
    fn fragments(&self) -> &'static [(&'static str, &'static str, u32)] {
        match self {
            Self::GrowingCaption => &[
                ("Silva, Ana", "we should", 0),
                ("Silva, Ana", "we should review the", 1),
                ("Silva, Ana", "we should review the quarterly numbers", 2),
                ("Okafor, Ben", "Agreed.", 3),
                ("Silva, Ana", "we should review the quarterly numbers before friday", 4),
            ],
            Self::Corrections => &[
                ("Hetz, Doron", "This is a test 12", 0),
                ("Hetz, Doron", "This is a test, 12,", 1),
                ("Okafor, Ben", "the deployment finished around noon today", 2),
                ("Hetz, Doron", "This is a test, 123.", 3),
                ("Okafor, Ben", "the deployment finished around noon, okay", 4),
            ],
        }
    }
}

#[derive(clap::Parser)]
#[command(name = "replay", about = "Replay a caption fixture through the engine")]
struct Args {
    #[arg(short, long, value_enum, default_value_t = Fixture::GrowingCaption)]
    fixture: Fixture,

    /// Run the post-merge duplicate scrub on the exported timeline.
    #[arg(short, long)]
    dedup: bool,

    /// Merge without the auto-correction rules.
    #[arg(short, long)]
    loose: bool,
}

fn main() {
    use clap::Parser;
    let args = Args::parse();

    let strictness = if args.loose {
        Strictness::Loose
    } else {
        Strictness::Strict
    };
    let mut engine = ReconciliationEngine::with_config(
        Default::default(),
        SimilarityMatcher::new(strictness),
    );

    eprintln!("replaying fixture `{}` ({strictness:?})", args.fixture);
    eprintln!();

    for (speaker, text, sec) in args.fixture.fragments() {
        let tag = TimestampTag::from_hms(10, 0, *sec).expect("fixture seconds are valid");
        let outcome = engine.reconcile(speaker, text, tag);
        let marker = match outcome.action {
            ReconcileAction::Appended => "APPEND ",
            ReconcileAction::Merged => "MERGE  ",
            ReconcileAction::Discarded => "DISCARD",
        };
        eprintln!("[{marker}] {speaker}: {text}");
    }

    let chat = [TranscriptLine::chat(
        "Ben Okafor",
        "link to the numbers is in the doc",
        TimestampTag::from_hms(10, 0, 2).expect("valid time"),
    )];

    let mut merged = timeline::merge(&[engine.history(), &chat]);
    if args.dedup {
        merged = timeline::scrub(&merged);
    }

    eprintln!();
    eprintln!(
        "final history: {} caption line(s), export below",
        engine.len()
    );
    eprintln!("---");

    for line in &merged {
        println!("{}", line.render());
    }
}
