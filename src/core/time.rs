//! Управление временем симуляции

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use serde::{Serialize, Deserialize};

/// Погрешность сравнения времени: тики дробные, накопление ошибок неизбежно
pub const EPSILON: f64 = 1e-9;

/// Момент модельного времени
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn new(seconds: f64) -> Self {
        SimTime(seconds.max(0.0))
    }

    pub fn as_seconds(&self) -> f64 {
        self.0
    }

    /// Наступил ли момент `other` к текущему времени (с учетом погрешности)
    pub fn reached(&self, other: SimTime) -> bool {
        other.0 <= self.0 + EPSILON
    }

    /// Разность моментов в секундах, не меньше нуля
    pub fn since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

impl Add for SimTime {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        SimTime(self.0 + other.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = Self;

    fn add(self, other: Duration) -> Self {
        SimTime(self.0 + other.0)
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, other: Duration) {
        self.0 += other.0;
    }
}

impl Sub for SimTime {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        SimTime((self.0 - other.0).max(0.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Длительность: размер тика, квант Round Robin
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Duration(f64);

impl Duration {
    pub fn from_seconds(secs: f64) -> Self {
        Duration(secs.max(0.0))
    }

    pub fn as_seconds(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 <= EPSILON
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}
