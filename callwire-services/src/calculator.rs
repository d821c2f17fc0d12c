//! Calculator service.
//!
//! The arithmetic lives in small pure types ([`PrimeFactors`], [`Average`],
//! [`RunningMax`]) so the handlers only deal with the call.

use callwire::{CallContext, Receiver, RpcRouter, Sender, Status};
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "calculator.CalculatorService";

pub const SUM: &str = "/calculator.CalculatorService/Sum";
pub const PRIME_NUMBER_DECOMPOSITION: &str =
    "/calculator.CalculatorService/PrimeNumberDecomposition";
pub const COMPUTE_AVERAGE: &str = "/calculator.CalculatorService/ComputeAverage";
pub const FIND_MAXIMUM: &str = "/calculator.CalculatorService/FindMaximum";
pub const SQUARE_ROOT: &str = "/calculator.CalculatorService/SquareRoot";

/// Divisor advances between two scheduler yields in the prime decomposition.
const YIELD_EVERY: u64 = 4096;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SumRequest {
    #[prost(double, tag = "1")]
    pub first_number: f64,
    #[prost(double, tag = "2")]
    pub second_number: f64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SumResponse {
    #[prost(double, tag = "1")]
    pub sum_result: f64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrimeNumberDecompositionRequest {
    #[prost(int64, tag = "1")]
    pub number: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrimeNumberDecompositionResponse {
    #[prost(int64, tag = "1")]
    pub prime_factor: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeAverageRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeAverageResponse {
    #[prost(double, tag = "1")]
    pub average: f64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindMaximumRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindMaximumResponse {
    #[prost(int32, tag = "1")]
    pub maximum: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SquareRootRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SquareRootResponse {
    #[prost(double, tag = "1")]
    pub number_root: f64,
}

/// One step of trial division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// A prime factor was split off the residual.
    Factor(u64),
    /// The divisor moved on without finding a factor.
    Advanced,
    /// The residual reached 1.
    Done,
}

/// Prime factorization by trial division, one step at a time.
///
/// Factors come out in non-decreasing order with multiplicity. Once the
/// divisor squared exceeds the residual, the residual itself is prime and is
/// emitted directly.
#[derive(Clone, Debug)]
pub struct PrimeFactors {
    residual: u64,
    divisor: u64,
}

impl PrimeFactors {
    pub fn new(n: u64) -> Self {
        Self {
            residual: n,
            divisor: 2,
        }
    }

    pub fn advance(&mut self) -> Step {
        if self.residual <= 1 {
            return Step::Done;
        }
        if self.divisor.saturating_mul(self.divisor) > self.residual {
            let prime = self.residual;
            self.residual = 1;
            return Step::Factor(prime);
        }
        if self.residual % self.divisor == 0 {
            self.residual /= self.divisor;
            Step::Factor(self.divisor)
        } else {
            self.divisor += 1;
            Step::Advanced
        }
    }
}

impl Iterator for PrimeFactors {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            match self.advance() {
                Step::Factor(factor) => return Some(factor),
                Step::Advanced => continue,
                Step::Done => return None,
            }
        }
    }
}

/// Running mean of 32-bit inputs; the mean of nothing is 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct Average {
    sum: i64,
    count: u64,
}

impl Average {
    pub fn push(&mut self, number: i32) {
        self.sum += i64::from(number);
        self.count += 1;
    }

    pub fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Maximum of everything observed so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningMax {
    max: Option<i32>,
}

impl RunningMax {
    /// Fold in `number` and return the new maximum.
    pub fn observe(&mut self, number: i32) -> i32 {
        let max = self.max.map_or(number, |max| max.max(number));
        self.max = Some(max);
        max
    }
}

pub fn router() -> RpcRouter {
    RpcRouter::new()
        .unary(SERVICE, "Sum", sum)
        .server_stream(SERVICE, "PrimeNumberDecomposition", prime_number_decomposition)
        .client_stream(SERVICE, "ComputeAverage", compute_average)
        .bidi_stream(SERVICE, "FindMaximum", find_maximum)
        .unary(SERVICE, "SquareRoot", square_root)
}

async fn sum(_ctx: CallContext, req: SumRequest) -> Result<SumResponse, Status> {
    Ok(SumResponse {
        sum_result: req.first_number + req.second_number,
    })
}

async fn prime_number_decomposition(
    ctx: CallContext,
    req: PrimeNumberDecompositionRequest,
    tx: Sender<PrimeNumberDecompositionResponse>,
) -> Result<(), Status> {
    let number = u64::try_from(req.number)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| {
            Status::invalid_argument(format!("Received non-positive number: {}", req.number))
        })?;
    tracing::debug!(number, "decomposing into prime factors");

    let mut factors = PrimeFactors::new(number);
    let mut advances: u64 = 0;
    loop {
        match factors.advance() {
            Step::Factor(factor) => {
                // Factors never exceed the i64 input.
                let prime_factor = factor as i64;
                tx.send(PrimeNumberDecompositionResponse { prime_factor }).await?;
            }
            Step::Advanced => {
                ctx.check()?;
                advances += 1;
                if advances % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Step::Done => return Ok(()),
        }
    }
}

async fn compute_average(
    _ctx: CallContext,
    mut rx: Receiver<ComputeAverageRequest>,
) -> Result<ComputeAverageResponse, Status> {
    let mut average = Average::default();
    while let Some(req) = rx.recv().await? {
        average.push(req.number);
    }
    Ok(ComputeAverageResponse {
        average: average.value(),
    })
}

async fn find_maximum(
    _ctx: CallContext,
    mut rx: Receiver<FindMaximumRequest>,
    tx: Sender<FindMaximumResponse>,
) -> Result<(), Status> {
    let mut running = RunningMax::default();
    while let Some(req) = rx.recv().await? {
        let maximum = running.observe(req.number);
        tx.send(FindMaximumResponse { maximum }).await?;
    }
    Ok(())
}

async fn square_root(
    _ctx: CallContext,
    req: SquareRootRequest,
) -> Result<SquareRootResponse, Status> {
    if req.number < 0 {
        return Err(Status::invalid_argument(format!(
            "Received negative number: {}",
            req.number
        )));
    }
    Ok(SquareRootResponse {
        number_root: f64::from(req.number).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use callwire::prelude::coordinate;
    use callwire::{Code, LocalChannel};
    use futures::StreamExt;
    use std::time::Duration;

    fn is_prime(n: u64) -> bool {
        n >= 2 && (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[test]
    fn test_prime_factors_of_twelve() {
        assert_eq!(PrimeFactors::new(12).collect::<Vec<_>>(), vec![2, 2, 3]);
        assert_eq!(PrimeFactors::new(1).count(), 0);
        assert_eq!(PrimeFactors::new(97).collect::<Vec<_>>(), vec![97]);
    }

    #[test]
    fn test_prime_factors_properties() {
        for n in 1..=2_000u64 {
            let factors: Vec<u64> = PrimeFactors::new(n).collect();
            assert_eq!(factors.iter().product::<u64>(), n, "product for {n}");
            assert!(factors.iter().all(|f| is_prime(*f)), "primality for {n}");
            assert!(factors.windows(2).all(|w| w[0] <= w[1]), "order for {n}");
        }
    }

    #[test]
    fn test_average() {
        let mut average = Average::default();
        assert_eq!(average.value(), 0.0);
        for number in [1, 2, 3, 4, 99] {
            average.push(number);
        }
        assert_eq!(average.value(), 21.8);
    }

    #[test]
    fn test_running_max() {
        let mut running = RunningMax::default();
        let maxima: Vec<i32> = [2, 1, 3, 2, 99].into_iter().map(|n| running.observe(n)).collect();
        assert_eq!(maxima, vec![2, 2, 3, 3, 99]);

        let mut running = RunningMax::default();
        assert_eq!(running.observe(-5), -5);
    }

    fn channel() -> LocalChannel {
        LocalChannel::new(router())
    }

    #[tokio::test]
    async fn test_sum() {
        let ctx = CallContext::new();
        let resp: SumResponse = channel()
            .unary(
                SUM,
                &ctx,
                SumRequest {
                    first_number: 3.0,
                    second_number: 10.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.sum_result, 13.0);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_stream() {
        let ctx = CallContext::new();
        let rx = channel()
            .server_stream::<_, PrimeNumberDecompositionResponse>(
                PRIME_NUMBER_DECOMPOSITION,
                &ctx,
                PrimeNumberDecompositionRequest { number: 120 },
            )
            .await
            .unwrap();

        let factors: Vec<i64> = rx.into_stream().map(|r| r.unwrap().prime_factor).collect().await;
        assert_eq!(factors, vec![2, 2, 2, 3, 5]);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_rejects_non_positive() {
        let ctx = CallContext::new();
        for number in [0, -7] {
            let mut rx = channel()
                .server_stream::<_, PrimeNumberDecompositionResponse>(
                    PRIME_NUMBER_DECOMPOSITION,
                    &ctx,
                    PrimeNumberDecompositionRequest { number },
                )
                .await
                .unwrap();
            assert_eq!(rx.recv().await.unwrap_err().code(), Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_of_one_is_empty() {
        let ctx = CallContext::new();
        let mut rx = channel()
            .server_stream::<_, PrimeNumberDecompositionResponse>(
                PRIME_NUMBER_DECOMPOSITION,
                &ctx,
                PrimeNumberDecompositionRequest { number: 1 },
            )
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_stops_when_cancelled() {
        let ctx = CallContext::new();
        // 2^61 - 1 is prime; the large factor follows a long run of divisor advances.
        let number = 2 * 2_305_843_009_213_693_951;
        let mut rx = channel()
            .server_stream::<_, PrimeNumberDecompositionResponse>(
                PRIME_NUMBER_DECOMPOSITION,
                &ctx,
                PrimeNumberDecompositionRequest { number },
            )
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap().prime_factor, 2);
        ctx.cancel();
        assert_eq!(rx.recv().await.unwrap_err().code(), Code::Canceled);
    }

    #[tokio::test]
    async fn test_compute_average() {
        let ctx = CallContext::new();
        let call = channel()
            .client_stream::<ComputeAverageRequest, ComputeAverageResponse>(COMPUTE_AVERAGE, &ctx)
            .unwrap();
        for number in [1, 2, 3, 4, 99] {
            call.send(ComputeAverageRequest { number }).await.unwrap();
        }
        assert_eq!(call.close_and_recv().await.unwrap().average, 21.8);

        let call = channel()
            .client_stream::<ComputeAverageRequest, ComputeAverageResponse>(COMPUTE_AVERAGE, &ctx)
            .unwrap();
        assert_eq!(call.close_and_recv().await.unwrap().average, 0.0);
    }

    #[tokio::test]
    async fn test_find_maximum() {
        let ctx = CallContext::new();
        let (tx, rx) = channel()
            .bidi_stream::<FindMaximumRequest, FindMaximumResponse>(FIND_MAXIMUM, &ctx)
            .unwrap();
        let numbers = futures::stream::iter([2, 1, 3, 2, 99]).map(|number| FindMaximumRequest { number });

        let maxima = coordinate(numbers, tx, rx, Vec::new(), |seen: &mut Vec<i32>, resp: FindMaximumResponse| {
            seen.push(resp.maximum)
        })
        .await
        .unwrap();
        assert_eq!(maxima, vec![2, 2, 3, 3, 99]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_maximum_stops_at_deadline() {
        let ctx = CallContext::with_timeout(Some(Duration::from_secs(1)));
        let (tx, mut rx) = channel()
            .bidi_stream::<FindMaximumRequest, FindMaximumResponse>(FIND_MAXIMUM, &ctx)
            .unwrap();

        tx.send(FindMaximumRequest { number: 2 }).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().maximum, 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let err = tx.send(FindMaximumRequest { number: 99 }).await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        let err = rx.recv().await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_square_root() {
        let ctx = CallContext::new();
        let resp: SquareRootResponse = channel()
            .unary(SQUARE_ROOT, &ctx, SquareRootRequest { number: 16 })
            .await
            .unwrap();
        assert_eq!(resp.number_root, 4.0);

        let err = channel()
            .unary::<_, SquareRootResponse>(SQUARE_ROOT, &ctx, SquareRootRequest { number: -12 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), Some("Received negative number: -12"));
    }
}
