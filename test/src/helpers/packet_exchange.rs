use log::warn;

use wraith_shared::Millis;

use super::TestPair;

/// Virtual time between two ticks of a [`TestPair`].
pub const TICK_MS: Millis = 10;

impl TestPair {
    /// Ticks the client, then the server, then advances the clock.
    pub fn tick(&mut self) {
        self.client.tick(self.now, &self.client_world);
        self.client_events.extend(self.client.take_connection_events());

        self.server.tick(self.now, &self.server_world);
        self.server_events.extend(self.server.take_connection_events());

        self.now += TICK_MS;
    }

    /// Ticks for `duration` milliseconds of virtual time.
    pub fn advance(&mut self, duration: Millis) {
        let end = self.now + duration;
        while self.now < end {
            self.tick();
        }
    }

    /// Ticks until `done` holds, for at most `limit` milliseconds. Returns
    /// whether `done` was reached.
    pub fn run_until(&mut self, limit: Millis, mut done: impl FnMut(&mut Self) -> bool) -> bool {
        let end = self.now + limit;
        while self.now < end {
            self.tick();
            if done(self) {
                return true;
            }
        }
        warn!("gave up waiting after {}ms, now at {}ms", limit, self.now);
        false
    }
}
