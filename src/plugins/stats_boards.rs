use std::{collections::BTreeMap, fmt::Display, time::Duration};

use bevy::prelude::*;

use crate::config::GameConfig;
use crate::persistence::UserContext;
use crate::simulation::run_loop::{RunLoop, RunState};
use crate::simulation::session::LifeSession;
use crate::simulation::view::Viewport;

#[derive(Resource, Default)]
pub struct StatsBoard {
    data: BTreeMap<String, String>,
}

impl StatsBoard {
    /// Insert or update a stat.
    pub fn insert<V: Display>(&mut self, key: &str, value: V) {
        self.data.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    fn render(&self) -> String {
        use std::fmt::Write;

        if self.data.is_empty() {
            return "No Stats".to_string();
        }
        let mut output = String::new();
        for (key, value) in &self.data {
            let _ = writeln!(output, "{}: {}", key, value);
        }
        output
    }
}

/// One transient message at a time. A newer notice replaces the older one.
#[derive(Resource, Debug)]
pub struct Notice {
    text: Option<String>,
    timer: Timer,
}

impl Notice {
    pub fn new(duration: Duration) -> Self {
        Self {
            text: None,
            timer: Timer::new(duration, TimerMode::Once),
        }
    }

    pub fn show(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
        self.timer.reset();
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn dismiss(&mut self) {
        self.text = None;
    }

    /// Returns `true` when the notice expired during this tick.
    pub fn tick(&mut self, delta: Duration) -> bool {
        if self.text.is_none() {
            return false;
        }
        if self.timer.tick(delta).is_finished() {
            self.text = None;
            return true;
        }
        false
    }
}

impl Default for Notice {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

pub struct StatsBoardPlugin;

impl Plugin for StatsBoardPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.init_resource::<StatsBoard>()
            .insert_resource(Notice::new(config.persistence.notice_duration()))
            .add_systems(Startup, setup_stats_ui)
            .add_systems(Update, (expire_notice, collect_stats, update_stats_display).chain());
    }
}

#[derive(Component)]
struct StatsText;

fn setup_stats_ui(mut commands: Commands) {
    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                bottom: Val::Px(10.0),
                left: Val::Px(10.0),
                padding: UiRect::all(Val::Px(10.0)),
                ..default()
            },
            BackgroundColor(Color::BLACK.with_alpha(0.7)),
            GlobalZIndex(100),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("Loading..."),
                TextFont {
                    font_size: 18.0,
                    ..default()
                },
                TextColor(Color::WHITE),
                StatsText,
            ));
        });
}

fn expire_notice(time: Res<Time>, mut notice: ResMut<Notice>) {
    if notice.text().is_none() {
        return;
    }
    if notice.bypass_change_detection().tick(time.delta()) {
        notice.set_changed();
    }
}

/// Human-readable counts: 950, 12.3K, 4.56M.
pub fn format_metric(value: u64) -> String {
    match value {
        0..1_000 => value.to_string(),
        1_000..1_000_000 => format!("{:.1}K", value as f64 / 1_000.0),
        1_000_000..1_000_000_000 => format!("{:.2}M", value as f64 / 1_000_000.0),
        _ => format!("{:.2}B", value as f64 / 1_000_000_000.0),
    }
}

fn run_label(run_loop: &RunLoop) -> String {
    match (run_loop.batch_remaining(), run_loop.state()) {
        (Some(remaining), _) => format!("Batch ({} left)", remaining),
        (None, RunState::Running) => "Running".to_string(),
        (None, RunState::Stopped) => "Stopped".to_string(),
    }
}

fn collect_stats(
    session: Res<LifeSession>,
    run_loop: Res<RunLoop>,
    viewport: Res<Viewport>,
    notice: Res<Notice>,
    user: Option<Res<UserContext>>,
    mut board: ResMut<StatsBoard>,
) {
    let user_changed = user.as_ref().is_some_and(|u| u.is_changed());
    if !(session.is_changed()
        || run_loop.is_changed()
        || viewport.is_changed()
        || notice.is_changed()
        || user_changed)
    {
        return;
    }

    match user {
        Some(user) => board.insert("Player", &user.username),
        None => board.insert("Player", "-"),
    }
    board.insert("Generation", session.generation());
    board.insert("Population", format_metric(session.population()));
    board.insert("State", run_label(&run_loop));
    board.insert("Zoom", format!("{:.0}px", viewport.cell_size));
    match notice.text() {
        Some(text) => board.insert("Notice", text),
        None => board.remove("Notice"),
    }
}

fn update_stats_display(board: Res<StatsBoard>, mut query: Query<&mut Text, With<StatsText>>) {
    if !board.is_changed() {
        return;
    }
    let output = board.render();
    for mut text in &mut query {
        **text = output.clone();
    }
}
