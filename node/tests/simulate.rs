use std::{fmt::Write, fs};

use machine_learning::{
    City,
    dataset::{CITY_COLUMN, ENV_FEATURES, TARGET, TEXT_FEATURE, WEARABLE_FEATURES},
};
use node::simulate::{self, SimulateArgs};

fn dataset(rows_per_city: usize) -> String {
    let mut header = vec![CITY_COLUMN];
    header.extend(ENV_FEATURES);
    header.push(TEXT_FEATURE);
    header.extend(WEARABLE_FEATURES);
    header.push(TARGET);

    let mut csv = header.join(",");
    csv.push('\n');

    for city in City::ALL {
        for i in 0..rows_per_city {
            let x = i as f64;
            let density = ["Rural", "Urban", "Suburban"][i % 3];

            writeln!(
                csv,
                "\"{city}\",{},{},3,{},1,{},50,300,0.5,{density},{},97,{},7,16,36.6,{}",
                x,
                x * 2.,
                x % 5.,
                20. + x,
                70. + x,
                5000. + x * 10.,
                i % 7
            )
            .unwrap();
        }
    }

    csv
}

#[tokio::test(flavor = "multi_thread")]
async fn simulation_trains_saves_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.csv");
    fs::write(&data, dataset(15)).unwrap();

    let args = SimulateArgs {
        rounds: 2,
        data,
        model_dir: dir.path().join("model"),
        seed: 7,
        round_timeout_secs: 60,
    };

    let outcome = simulate::run(args).await.unwrap();

    assert_eq!(outcome.history.rounds.len(), 2);
    for round in &outcome.history.rounds {
        assert_eq!(round.participants.len(), City::ALL.len());
        assert!(round.failures.is_empty());
        assert!(round.evaluation.is_some());
    }

    let artifacts = node::verify(&outcome.model_dir).unwrap();
    assert_eq!(artifacts.weights(), outcome.params);
}

#[tokio::test]
async fn missing_dataset_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();

    let args = SimulateArgs {
        rounds: 1,
        data: dir.path().join("missing.csv"),
        model_dir: dir.path().join("model"),
        seed: 42,
        round_timeout_secs: 60,
    };

    assert!(simulate::run(args).await.is_err());
    assert!(!dir.path().join("model").exists());
}
