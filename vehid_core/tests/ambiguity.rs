mod common;

use vehid_core::{FingerprintDatabase, MatchCfg, MatchResult, match_samples};
use vehid_traits::CanFrame;

#[test]
fn identical_signatures_tie_and_fall_back_to_first_registered() {
    let sig = common::signature(0);
    let db = FingerprintDatabase::builder()
        .add("SECOND_NAME_FIRST".into(), vec![sig.clone()])
        .add("A_FIRST_ALPHABETICALLY".into(), vec![sig.clone()])
        .build()
        .unwrap();
    let frames = common::frames_of(&sig);

    for _ in 0..10 {
        let r = match_samples(&db, &MatchCfg::default(), &frames);
        let MatchResult::Ambiguous(cands) = &r else {
            panic!("expected ambiguous, got {r:?}");
        };
        assert_eq!(cands.len(), 2);
        assert_eq!(r.canonical().unwrap().identity.as_str(), "SECOND_NAME_FIRST");
    }
}

#[test]
fn empty_traffic_is_ambiguous_over_everything() {
    let db = common::database();
    let r = match_samples(&db, &MatchCfg::default(), &Vec::<CanFrame>::new());
    let MatchResult::Ambiguous(cands) = &r else {
        panic!("expected ambiguous, got {r:?}");
    };
    assert_eq!(cands.len(), common::NAMES.len());
    assert_eq!(r.canonical().unwrap().identity.as_str(), common::NAMES[0]);
}
