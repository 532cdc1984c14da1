pub mod mock_service;
