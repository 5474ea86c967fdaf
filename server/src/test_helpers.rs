use rocket::{figment::Figment, local::asynchronous::Client, Build, Ignite, Rocket};

pub use crate::session::APPLICATION_SESSION_KEY as SESSION_KEY;

// 256-bit hex key so private cookies decrypt across requests in a test.
const TEST_SECRET_KEY: &str = "8a1c2c0a7e0b3f4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5";

pub fn figment() -> Figment {
    rocket::Config::figment()
        .merge(("secret_key", TEST_SECRET_KEY))
        .merge(("log_level", "off"))
}

pub fn rocket() -> Rocket<Build> {
    rocket_with(figment())
}

pub fn rocket_with(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
}

pub async fn ignite(rocket: Rocket<Build>) -> Rocket<Ignite> {
    match rocket.ignite().await {
        Ok(rocket) => rocket,
        Err(error) => panic!("rocket failed to ignite: {}", error),
    }
}

pub async fn client(rocket: Rocket<Build>) -> Client {
    match Client::tracked(rocket).await {
        Ok(client) => client,
        Err(error) => panic!("could not create test client: {}", error),
    }
}
