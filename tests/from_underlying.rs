use num::{BigUint, One, Zero};
use proptest::prelude::*;
use symbolic_harness::{
  config::{OutOfGasMode, OverflowMode},
  replay, verify, Error, Replay, SolverConfig, Target,
};

// The same conversion over uint8, with a scaling factor of 10, so that
// symbolic division stays cheap.
const NARROW: &str = "
  const _SCALING_FACTOR: uint8 = 10

  contract SafeMath8
    function add(a: uint8, b: uint8) internal returns (uint8)
      var c: uint8
      var wrapped: bool
      c = add a b
      wrapped = lt c a
      br wrapped overflow done
    overflow:
      revert
    done:
      ret c
    end
    function sub(a: uint8, b: uint8) internal returns (uint8)
      var c: uint8
      var under: bool
      under = gt b a
      br under underflow done
    underflow:
      revert
    done:
      c = sub a b
      ret c
    end
    function mul(a: uint8, b: uint8) internal returns (uint8)
      var c: uint8
      var zero: uint8
      var a_is_zero: bool
      var q: uint8
      var fits: bool
      zero = const 0
      a_is_zero = eq a zero
      br a_is_zero trivial product
    trivial:
      ret zero
    product:
      c = mul a b
      q = div c a
      fits = eq q b
      br fits done overflow
    overflow:
      revert
    done:
      ret c
    end
    function div(a: uint8, b: uint8) internal returns (uint8)
      var c: uint8
      var zero: uint8
      var positive: bool
      zero = const 0
      positive = gt b zero
      br positive done by_zero
    by_zero:
      revert
    done:
      c = div a b
      ret c
    end

  contract Narrow is SafeMath8
    function _fromUnderlying(underlying: uint8, exchangeRate: uint8, roundUp: bool) internal returns (uint8)
      var scale: uint8
      var one: uint8
      var scaled: uint8
      var slack: uint8
      var numerator: uint8
      var amount: uint8
      scale = const _SCALING_FACTOR
      scaled = call mul underlying scale
      br roundUp up down
    up:
      one = const 1
      slack = call sub exchangeRate one
      numerator = call add scaled slack
      amount = call div numerator exchangeRate
      ret amount
    down:
      amount = call div scaled exchangeRate
      ret amount
    end
";

fn narrow() -> Target {
  Target {
    source: NARROW.to_string(),
    contract: "Narrow".to_string(),
    function: "_fromUnderlying".to_string(),
    entry: "fromUnderlying".to_string(),
    unconstrained: Vec::new(),
  }
}

fn n(s: &str) -> BigUint {
  BigUint::parse_bytes(s.as_bytes(), 10).unwrap()
}

#[test]
fn historical_candidate_returns_zero_when_rounding_down() {
  let args = [
    BigUint::one(),
    n("14474011154664523624477350999513853985339507749031138909263555379280740351999"),
    BigUint::zero(),
  ];
  let res = replay(&SolverConfig::default(), &Target::dharma(), &args).unwrap();
  assert!(res.returns_zero(), "{:?}", res);
  assert_eq!(res.value(), Some(&BigUint::zero()));
}

#[test]
fn historical_candidate_is_nonzero_when_rounding_up() {
  let args = [
    BigUint::one(),
    n("14474011154664523624477350999513853985339507749031138909263555379280740351999"),
    BigUint::one(),
  ];
  let res = replay(&SolverConfig::default(), &Target::dharma(), &args).unwrap();
  assert_eq!(res.value(), Some(&BigUint::one()));
}

#[test]
fn unit_inputs_return_one_ether() {
  let one = BigUint::one();
  let res = replay(&SolverConfig::default(), &Target::dharma(), &[one.clone(), one.clone(), one]).unwrap();
  assert_eq!(res.value(), Some(&n("1000000000000000000")));
}

#[test]
fn rounding_up_never_returns_zero() {
  let outcome = verify(&SolverConfig::default(), &narrow()).unwrap();
  assert!(outcome.exhausted);
  assert!(outcome.holds(), "{:?}", outcome.counterexamples);
  assert!(outcome.ready > 0);
  assert!(outcome.terminated > 0);
}

#[test]
fn free_rounding_flag_exposes_the_zero_result() {
  let target = Target { unconstrained: vec!["roundUp".to_string()], ..narrow() };
  let outcome = verify(&SolverConfig::default(), &target).unwrap();
  assert_eq!(outcome.counterexamples.len(), 1);
  let cex = &outcome.counterexamples[0];
  assert_eq!(cex.output, BigUint::zero());
  assert_eq!(cex.input("roundUp"), Some(&BigUint::zero()));
  let underlying = cex.input("underlying").unwrap();
  let rate = cex.input("exchangeRate").unwrap();
  assert!(!underlying.is_zero());
  assert!(rate > &(underlying * 10u32));
  assert!(cex.to_string().starts_with("fromUnderlying("));
  assert!(cex.to_string().ends_with(") -> 0"));

  let args: Vec<BigUint> = cex.inputs.iter().map(|(_, v)| v.clone()).collect();
  let res = replay(&SolverConfig::default(), &target, &args).unwrap();
  assert!(res.returns_zero());
}

#[test]
fn verdicts_are_deterministic() {
  let target = Target { unconstrained: vec!["roundUp".to_string()], ..narrow() };
  let first = verify(&SolverConfig::default(), &target).unwrap();
  let second = verify(&SolverConfig::default(), &target).unwrap();
  assert_eq!(first.counterexamples.len(), second.counterexamples.len());
  assert_eq!(first.ready, second.ready);
  assert_eq!(first.terminated, second.terminated);
}

#[test]
fn out_of_gas_is_ignored_or_fatal() {
  let starved = SolverConfig { gas_limit: 60, ..SolverConfig::default() };
  let outcome = verify(&starved, &narrow()).unwrap();
  assert_eq!(outcome.ready, 0);
  assert!(outcome.holds());

  let fatal = SolverConfig { oog: OutOfGasMode::Fatal, ..starved };
  assert!(matches!(verify(&fatal, &narrow()), Err(Error::OutOfGas { .. })));
}

#[test]
fn faulting_overflow_keeps_the_verdict() {
  let config = SolverConfig { overflow: OverflowMode::Fault, ..SolverConfig::default() };
  let outcome = verify(&config, &narrow()).unwrap();
  assert!(outcome.holds());
  assert!(outcome.terminated > 0);
}

#[test]
fn setup_faults_stop_the_run() {
  let missing = Target { contract: "Missing".to_string(), ..narrow() };
  assert!(matches!(verify(&SolverConfig::default(), &missing), Err(Error::Setup(_))));
  let external = Target { function: "fromUnderlying".to_string(), ..narrow() };
  assert!(matches!(verify(&SolverConfig::default(), &external), Err(Error::Setup(_))));
  let broken = Target { source: "contract Broken\nfunction f() external\n".to_string(), ..narrow() };
  assert!(matches!(verify(&SolverConfig::default(), &broken), Err(Error::Compile { line: 2, .. })));
}

#[test]
#[ignore = "full-width symbolic division is slow"]
fn bundled_contract_never_returns_zero() {
  let outcome = verify(&SolverConfig::default(), &Target::dharma()).unwrap();
  assert!(outcome.holds(), "{:?}", outcome.counterexamples);
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn nonzero_inputs_never_return_zero(underlying in 1u64.., rate in 1u64..) {
    let args = [BigUint::from(underlying), BigUint::from(rate), BigUint::one()];
    let res = replay(&SolverConfig::default(), &Target::dharma(), &args).unwrap();
    match res {
      Replay::Returned(vals) => prop_assert!(vals.iter().all(|v| !v.is_zero())),
      Replay::Reverted => {}
    }
  }
}
