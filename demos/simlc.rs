use lcpredict::{ConstantMean, CovParams, LightCurve, Predictor, Rank};
use ndarray::{concatenate, Array, Array1, Axis};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    env_logger::init();
    let mut rng = Xoshiro256Plus::seed_from_u64(42);

    // Unconstrained mock of a smooth stochastic light curve sampled every 0.5 day
    let params = Predictor::params(
        ConstantMean::new(10.).expect("finite mean"),
        "kepler_exp",
        CovParams::new(2., 10.).nu(0.2),
    )
    .rank(Rank::NearlyFull);
    let predictor = params.build().expect("unconstrained predictor");
    println!("Unconstrained realization with {predictor}");

    let epochs = Array::range(0., 200., 0.5);
    let errors = Array1::from_elem(epochs.len(), 0.5);
    let mock = predictor
        .generate(&epochs, errors.clone(), 1, 0., &mut rng)
        .expect("mock light curve")
        .remove(0);
    println!("(epoch, value, error)");
    println!(
        "{}",
        concatenate![
            Axis(1),
            epochs.view().insert_axis(Axis(1)),
            mock.view().insert_axis(Axis(1)),
            errors.view().insert_axis(Axis(1))
        ]
    );

    // Constrained by a sparse subset of the mock
    let idx: Vec<usize> = (0..epochs.len()).step_by(40).collect();
    let lc = LightCurve::new(
        epochs.select(Axis(0), &idx),
        mock.select(Axis(0), &idx),
        errors.select(Axis(0), &idx),
    )
    .expect("valid light curve");
    let constrained = params.fit(&lc).expect("constrained predictor");
    println!("Constrained realization from {} observations", lc.len());

    let (mean, variance) = constrained.evaluate(&epochs).expect("evaluation");
    println!("(epoch, mean, sigma)");
    println!(
        "{}",
        concatenate![
            Axis(1),
            epochs.view().insert_axis(Axis(1)),
            mean.view().insert_axis(Axis(1)),
            variance.mapv(f64::sqrt).insert_axis(Axis(1))
        ]
    );
}
