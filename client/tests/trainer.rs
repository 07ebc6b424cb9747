mod common;

use client::{ClientErr, LocalTrainer, TrainerState};
use comms::specs::training::FitSpec;
use machine_learning::{
    City, MlErr, ParameterVector, Tensor,
    arch::{Architecture, HealthArchitecture, Model},
};

use common::{RecordingArch, bundle, source};

fn vector(values: [f32; 2]) -> ParameterVector {
    ParameterVector::new(vec![Tensor::new(vec![2], values.to_vec()).unwrap()])
}

#[test]
fn second_fit_starts_from_the_second_global() {
    let arch = RecordingArch::default();
    let mut trainer = LocalTrainer::new(City::Delhi, arch.clone(), source(), bundle());

    let first = trainer.fit(1, &vector([1., 2.]), &FitSpec::default()).unwrap();
    assert_eq!(first.params, vector([2., 3.]));

    trainer.fit(2, &vector([5., 6.]), &FitSpec::default()).unwrap();

    let seen = arch.seen.lock().unwrap();
    assert_eq!(*seen, vec![vector([1., 2.]), vector([5., 6.])]);
}

#[test]
fn fit_reports_train_count_and_evaluate_reports_test_count() {
    let mut trainer = LocalTrainer::new(City::Delhi, RecordingArch::default(), source(), bundle());

    let fit = trainer.fit(1, &vector([0., 0.]), &FitSpec::default()).unwrap();
    assert_eq!(fit.sample_count, 16);
    assert!(fit.metrics.is_empty());

    let eval = trainer.evaluate(1, &vector([1., 2.])).unwrap();
    assert_eq!(eval.sample_count, 4);
    assert_eq!(eval.loss, 3.);
    assert_eq!(eval.metrics.get("mae"), Some(&4.));
}

#[test]
fn state_machine_walks_through_the_lifecycle() {
    let mut trainer = LocalTrainer::new(City::Beijing, RecordingArch::default(), source(), bundle());
    assert_eq!(trainer.state(), TrainerState::Created);

    trainer.evaluate(0, &vector([0., 0.])).unwrap();
    assert_eq!(trainer.state(), TrainerState::DataLoaded);

    trainer.fit(1, &vector([0., 0.]), &FitSpec::default()).unwrap();
    assert_eq!(trainer.state(), TrainerState::Ready);

    trainer.finish();
    assert_eq!(trainer.state(), TrainerState::Done);
    assert!(matches!(
        trainer.fit(2, &vector([0., 0.]), &FitSpec::default()),
        Err(ClientErr::Finished)
    ));
}

#[test]
fn city_without_rows_is_no_data_for_client() {
    let mut trainer = LocalTrainer::new(City::LosAngeles, RecordingArch::default(), source(), bundle());

    assert!(matches!(
        trainer.fit(1, &vector([0., 0.]), &FitSpec::default()),
        Err(ClientErr::Ml(MlErr::NoDataForClient(_)))
    ));
}

#[test]
fn wrong_global_shape_is_rejected() {
    let mut trainer = LocalTrainer::new(City::Delhi, RecordingArch::default(), source(), bundle());
    let wrong = ParameterVector::zeros(&[vec![3]]);

    assert!(matches!(
        trainer.fit(1, &wrong, &FitSpec::default()),
        Err(ClientErr::Ml(MlErr::ShapeMismatch { .. }))
    ));
}

#[test]
fn health_model_trains_on_a_partition() {
    let arch = HealthArchitecture;
    let global = arch.build(42).unwrap().get_weights();
    let mut trainer = LocalTrainer::new(City::Delhi, arch, source(), bundle());

    let fit = trainer.fit(1, &global, &FitSpec::default()).unwrap();
    assert_eq!(fit.params.shapes(), global.shapes());
    assert_ne!(fit.params, global);

    let eval = trainer.evaluate(1, &fit.params).unwrap();
    assert!(eval.loss.is_finite());
    assert!(eval.metrics.contains_key("mae"));
}
