use std::time::Duration;

use client_core::{CarouselSnapshot, RotationSchedule, RotationStatus};

const TITLE: &str = "Coffee Inspiration Gallery";
const SUBTITLE: &str = "Feast your eyes on these delightful coffee images, refreshed regularly";

pub struct CarouselView {
    refresh_period: Duration,
    advance_period: Duration,
}

impl CarouselView {
    pub fn new(schedule: &RotationSchedule) -> Self {
        Self {
            refresh_period: schedule.refresh_period(),
            advance_period: schedule.advance_period(),
        }
    }

    pub fn render(&self, snapshot: &CarouselSnapshot) -> String {
        match &snapshot.status {
            RotationStatus::Loading => {
                "[ .. ] Brewing a fresh batch of coffee images...".to_string()
            }
            RotationStatus::Failed { reason } => {
                ["!! Error Loading Coffee Images", reason.as_str()].join("\n")
            }
            RotationStatus::Ready => self.render_ready(snapshot),
        }
    }

    fn render_ready(&self, snapshot: &CarouselSnapshot) -> String {
        let mut lines = vec![TITLE.to_string(), SUBTITLE.to_string(), String::new()];

        let indicators: Vec<&str> = (0..snapshot.images.len())
            .map(|index| {
                if Some(index) == snapshot.pointer {
                    "●"
                } else {
                    "○"
                }
            })
            .collect();
        lines.push(format!("  {}", indicators.join(" ")));

        match (snapshot.pointer, snapshot.current()) {
            (Some(pointer), Some(image)) => {
                lines.push(format!("  Coffee Beauty #{}", pointer + 1));
                lines.push(format!("  {image}"));
                lines.push("  Enjoy this coffee masterpiece".to_string());
            }
            _ => lines.push("  (no image to show yet)".to_string()),
        }

        lines.push(String::new());
        lines.push(format!(
            "Images automatically update every {} seconds. New slide every {} seconds.",
            format_seconds(self.refresh_period),
            format_seconds(self.advance_period)
        ));
        if let Some(at) = snapshot.last_refreshed_at {
            lines.push(format!("Last refreshed at {}", at.format("%H:%M:%S UTC")));
        }
        if snapshot.refresh_failures > 0 {
            lines.push(format!(
                "{} refresh attempt(s) failed; some images may be stale.",
                snapshot.refresh_failures
            ));
        }

        lines.join("\n")
    }
}

fn format_seconds(period: Duration) -> String {
    if period.subsec_nanos() == 0 {
        period.as_secs().to_string()
    } else {
        format!("{:.1}", period.as_secs_f64())
    }
}
